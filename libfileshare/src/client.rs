//! Remote collaborators. Wire protocols live behind these traits.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::Protocol;
use crate::credential::AccountCredentials;
use crate::error::RemoteError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountOptions {
    pub name: String,
    pub resource_group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareOptions {
    pub name: String,
    pub protocol: Protocol,
    pub request_gib: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareProperties {
    pub quota_gib: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileServiceProperties {
    pub share_delete_retention_policy: Option<DeleteRetentionPolicy>,
}

/// The storage management API, authenticated with the cluster identity.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    async fn create_file_share(
        &self,
        resource_group: &str,
        account: &str,
        share: &ShareOptions,
    ) -> Result<(), RemoteError>;

    async fn delete_file_share(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
    ) -> Result<(), RemoteError>;

    async fn resize_file_share(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
        size_gib: u64,
    ) -> Result<(), RemoteError>;

    async fn get_file_share(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
    ) -> Result<ShareProperties, RemoteError>;

    /// `None` when the account reports no file service properties.
    async fn get_service_properties(
        &self,
        resource_group: &str,
        account: &str,
    ) -> Result<Option<FileServiceProperties>, RemoteError>;

    async fn set_service_properties(
        &self,
        resource_group: &str,
        account: &str,
        properties: &FileServiceProperties,
    ) -> Result<(), RemoteError>;

    async fn remove_account_tag(
        &self,
        resource_group: &str,
        account: &str,
        key: &str,
    ) -> Result<(), RemoteError>;

    async fn get_account_key(
        &self,
        account: &str,
        resource_group: &str,
    ) -> Result<String, RemoteError>;
}

/// Direct share access authenticated with the account key.
#[async_trait]
pub trait DataPlaneClient: Send + Sync {
    async fn create_file_share(
        &self,
        creds: &AccountCredentials,
        share: &ShareOptions,
    ) -> Result<(), RemoteError>;

    async fn delete_file_share(
        &self,
        creds: &AccountCredentials,
        share_name: &str,
    ) -> Result<(), RemoteError>;

    async fn resize_file_share(
        &self,
        creds: &AccountCredentials,
        share_name: &str,
        size_gib: u64,
    ) -> Result<(), RemoteError>;

    /// `None` when the share does not exist.
    async fn share_quota(
        &self,
        creds: &AccountCredentials,
        share_name: &str,
    ) -> Result<Option<u64>, RemoteError>;
}

/// Cluster secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<HashMap<String, Vec<u8>>, RemoteError>;
}
