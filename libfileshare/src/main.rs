mod cli;

use anyhow::{Context, anyhow};
use clap::Parser;
use cli::{Cli, Commands};
use libfileshare::classify::{ApiPlane, Operation, classify};
use libfileshare::config::load_config;
use libfileshare::share_name::valid_file_share_name;
use libfileshare::volume_id::{decode_snapshot_id, decode_volume_id};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::VolumeId { id } => {
            let v = decode_volume_id(id).with_context(|| format!("invalid volume id {id}"))?;
            println!("resource group: {}", v.resource_group);
            println!("account:        {}", v.account_name);
            println!("share:          {}", v.share_name);
            println!("disk:           {}", v.disk_name);
        }
        Commands::SnapshotId { id } => {
            println!("{}", decode_snapshot_id(id)?);
        }
        Commands::ShareName { volume_name } => {
            println!("{}", valid_file_share_name(volume_name));
        }
        Commands::Classify {
            message,
            op,
            data_plane,
        } => {
            let op: Operation = op.parse().map_err(|e: String| anyhow!(e))?;
            let plane = if *data_plane {
                ApiPlane::DataPlane
            } else {
                ApiPlane::ManagementPlane
            };
            println!("{:?}", classify(op, plane, message));
        }
        Commands::Config { path } => {
            let path = path
                .to_str()
                .ok_or_else(|| anyhow!("config path is not valid utf-8"))?;
            let cfg = load_config(path)?;
            print!("{}", serde_yaml::to_string(&cfg)?);
            println!("subnet resource id: {}", cfg.subnet_resource_id());
        }
    }

    Ok(())
}
