//! Resilience layer for provisioning network file shares: identifier
//! encoding, per-key locks, a single-flight TTL cache, remote error
//! classification with exponential backoff, and account key resolution.

pub mod backoff;
pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod lock;
pub mod manager;
pub mod share_name;
pub mod volume_id;

pub use backoff::{Attempt, Backoff, exponential_backoff};
pub use cache::{CacheReadType, TimedCache};
pub use classify::{ApiPlane, ErrorClass, Operation, classify};
pub use config::{DriverConfig, load_config};
pub use credential::{AccountCredentials, AccountSecrets, CredentialResolver, SecretRef};
pub use error::{RemoteError, Result, ShareError};
pub use lock::{LockGuard, LockRegistry};
pub use manager::{AccountInfo, ShareManager};
pub use volume_id::VolumeId;
