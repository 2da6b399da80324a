use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fileshare", version, about = "File share provisioning helper CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a volume id and print its fields
    VolumeId { id: String },
    /// Extract the snapshot timestamp from a snapshot id
    SnapshotId { id: String },
    /// Derive a valid share name from a volume name
    ShareName { volume_name: String },
    /// Show how a remote error message is handled
    Classify {
        message: String,
        /// create, delete, resize, get, remove-tag or disable-retention
        #[arg(long, default_value = "create")]
        op: String,
        #[arg(long)]
        data_plane: bool,
    },
    /// Validate a driver config file and print it with defaults filled in
    Config { path: PathBuf },
}
