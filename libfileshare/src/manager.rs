//! Share operations against the remote storage service.
//!
//! Every remote call runs inside [`exponential_backoff`] and has its errors
//! sorted by [`decide`]. Calls go to the management API unless the request
//! carried account secrets or the account was switched to the data plane
//! after being throttled.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::backoff::{Attempt, Backoff, exponential_backoff};
use crate::cache::{CacheReadType, TimedCache};
use crate::classify::{ApiPlane, Decision, Operation, decide};
use crate::client::{
    AccountOptions, DataPlaneClient, DeleteRetentionPolicy, ManagementClient, SecretStore,
    ShareOptions,
};
use crate::config::DriverConfig;
use crate::context::RequestContext;
use crate::credential::{AccountCredentials, AccountSecrets, CredentialResolver, SecretRef};
use crate::error::{RemoteError, Result, ShareError};
use crate::lock::LockRegistry;
use crate::volume_id::{VolumeId, decode_volume_id};

/// API surface chosen per account. Accounts start on the management plane
/// and move to the data plane once a delete gets throttled there.
#[derive(Default)]
pub struct AccountRoutes {
    planes: RwLock<HashMap<String, ApiPlane>>,
}

impl AccountRoutes {
    pub fn plane(&self, account: &str) -> ApiPlane {
        self.planes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    pub fn use_data_plane(&self, account: &str) {
        self.planes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.to_string(), ApiPlane::DataPlane);
    }
}

enum Route {
    Management,
    DataPlane(AccountCredentials),
}

impl Route {
    fn plane(&self) -> ApiPlane {
        match self {
            Route::Management => ApiPlane::ManagementPlane,
            Route::DataPlane(_) => ApiPlane::DataPlane,
        }
    }
}

/// Where a volume lives and how to authenticate against it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub resource_group: String,
    pub account_name: String,
    /// Empty for NFS shares, which need no key.
    pub account_key: String,
    pub share_name: String,
    pub disk_name: String,
}

impl fmt::Debug for AccountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountInfo")
            .field("resource_group", &self.resource_group)
            .field("account_name", &self.account_name)
            .field("share_name", &self.share_name)
            .field("disk_name", &self.disk_name)
            .finish_non_exhaustive()
    }
}

pub struct ShareManager {
    config: DriverConfig,
    backoff: Backoff,
    management: Arc<dyn ManagementClient>,
    data_plane: Arc<dyn DataPlaneClient>,
    credentials: CredentialResolver,
    routes: AccountRoutes,
    // account name -> tag key removed within the ttl
    remove_tag_cache: TimedCache<String>,
    volume_locks: LockRegistry,
    subnet_locks: LockRegistry,
}

impl ShareManager {
    pub fn new(
        config: DriverConfig,
        management: Arc<dyn ManagementClient>,
        data_plane: Arc<dyn DataPlaneClient>,
        secret_store: Option<Arc<dyn SecretStore>>,
    ) -> Self {
        let credentials = CredentialResolver::new(
            management.clone(),
            secret_store,
            config.secrets.default_namespace.clone(),
        );
        let remove_tag_cache = TimedCache::new(
            Duration::from_secs(config.cache.remove_tag_ttl_secs),
            |_account: String| async { Ok(None) },
        );
        Self {
            backoff: Backoff::from(&config.backoff),
            config,
            management,
            data_plane,
            credentials,
            routes: AccountRoutes::default(),
            remove_tag_cache,
            volume_locks: LockRegistry::new(),
            subnet_locks: LockRegistry::new(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    /// Serializes operations on one volume id.
    pub fn volume_locks(&self) -> &LockRegistry {
        &self.volume_locks
    }

    /// Serializes subnet updates, independently of volume operations.
    pub fn subnet_locks(&self) -> &LockRegistry {
        &self.subnet_locks
    }

    pub fn api_plane(&self, account: &str) -> ApiPlane {
        self.routes.plane(account)
    }

    pub async fn create_share(
        &self,
        account: &AccountOptions,
        share: &ShareOptions,
        secrets: &AccountSecrets,
    ) -> Result<()> {
        let (rg, name) = (account.resource_group.as_str(), account.name.as_str());
        let throttle_sleep = self.config.throttling.file_op_sleep();
        exponential_backoff(&self.backoff, || async move {
            let route = match self.route(rg, name, secrets).await {
                Ok(route) => route,
                Err(e) => return Attempt::Abort(e),
            };
            let result = match &route {
                Route::Management => self.management.create_file_share(rg, name, share).await,
                Route::DataPlane(creds) => self.data_plane.create_file_share(creds, share).await,
            };
            self.settle(
                Operation::CreateShare,
                &route,
                rg,
                name,
                &share.name,
                result,
                throttle_sleep,
            )
            .await
        })
        .await
    }

    /// Deleting a share that does not exist succeeds.
    pub async fn delete_share(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
        secrets: &AccountSecrets,
    ) -> Result<()> {
        let throttle_sleep = self.config.throttling.file_op_sleep();
        exponential_backoff(&self.backoff, || async move {
            let route = match self.route(resource_group, account, secrets).await {
                Ok(route) => route,
                Err(e) => return Attempt::Abort(e),
            };
            let result = match &route {
                Route::Management => {
                    self.management
                        .delete_file_share(resource_group, account, share_name)
                        .await
                }
                Route::DataPlane(creds) => {
                    self.data_plane.delete_file_share(creds, share_name).await
                }
            };
            self.settle(
                Operation::DeleteShare,
                &route,
                resource_group,
                account,
                share_name,
                result,
                throttle_sleep,
            )
            .await
        })
        .await
    }

    pub async fn resize_share(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
        size_gib: u64,
        secrets: &AccountSecrets,
    ) -> Result<()> {
        let throttle_sleep = self.config.throttling.file_op_sleep();
        exponential_backoff(&self.backoff, || async move {
            let route = match self.route(resource_group, account, secrets).await {
                Ok(route) => route,
                Err(e) => return Attempt::Abort(e),
            };
            let result = match &route {
                Route::Management => {
                    self.management
                        .resize_file_share(resource_group, account, share_name, size_gib)
                        .await
                }
                Route::DataPlane(creds) => {
                    self.data_plane
                        .resize_file_share(creds, share_name, size_gib)
                        .await
                }
            };
            self.settle(
                Operation::ResizeShare,
                &route,
                resource_group,
                account,
                share_name,
                result,
                throttle_sleep,
            )
            .await
        })
        .await
    }

    /// Quota of the share in GiB, `None` if the share does not exist.
    pub async fn get_share_quota(
        &self,
        resource_group: &str,
        account: &str,
        share_name: &str,
        secrets: &AccountSecrets,
    ) -> Result<Option<u64>> {
        let throttle_sleep = self.config.throttling.file_op_sleep();
        exponential_backoff(&self.backoff, || async move {
            let route = match self.route(resource_group, account, secrets).await {
                Ok(route) => route,
                Err(e) => return Attempt::Abort(e),
            };
            let result = match &route {
                Route::Management => {
                    match self
                        .management
                        .get_file_share(resource_group, account, share_name)
                        .await
                    {
                        Ok(props) => match props.quota_gib {
                            Some(quota) => Ok(Some(quota)),
                            None => {
                                return Attempt::Abort(ShareError::InvalidResponse(format!(
                                    "share({share_name}) on account({account}) has no quota"
                                )));
                            }
                        },
                        Err(e) => Err(e),
                    }
                }
                Route::DataPlane(creds) => self.data_plane.share_quota(creds, share_name).await,
            };
            self.settle(
                Operation::GetShare,
                &route,
                resource_group,
                account,
                share_name,
                result,
                throttle_sleep,
            )
            .await
        })
        .await
    }

    /// Removes tag `key` from the account, skipping the call when the same
    /// tag was removed within the cache ttl.
    pub async fn remove_account_tag(
        &self,
        resource_group: &str,
        account: &str,
        key: &str,
    ) -> Result<()> {
        let removed = self
            .remove_tag_cache
            .get(account, CacheReadType::UseCacheIfPresent)
            .await?;
        if removed.as_deref() == Some(key) {
            info!(
                "skip RemoveStorageAccountTag({key}) on account({account}) resourceGroup({resource_group}) since tag already removed in a short time"
            );
            return Ok(());
        }

        let throttle_sleep = self.config.throttling.account_op_sleep();
        exponential_backoff(&self.backoff, || async move {
            let result = self
                .management
                .remove_account_tag(resource_group, account, key)
                .await;
            self.settle(
                Operation::RemoveTag,
                &Route::Management,
                resource_group,
                account,
                key,
                result,
                throttle_sleep,
            )
            .await
        })
        .await?;

        self.remove_tag_cache.set(account, key.to_string()).await;
        Ok(())
    }

    pub async fn disable_delete_retention_policy(
        &self,
        resource_group: &str,
        account: &str,
    ) -> Result<()> {
        let throttle_sleep = self.config.throttling.account_op_sleep();
        let op = Operation::DisableRetentionPolicy;
        exponential_backoff(&self.backoff, || async move {
            let mut props = match self
                .management
                .get_service_properties(resource_group, account)
                .await
            {
                Ok(Some(props)) => props,
                Ok(None) => {
                    return Attempt::Abort(ShareError::InvalidResponse(format!(
                        "file service properties of account({account}), resource group({resource_group}) are missing"
                    )));
                }
                Err(e) => {
                    return self
                        .settle(
                            op,
                            &Route::Management,
                            resource_group,
                            account,
                            account,
                            Err::<(), _>(e),
                            throttle_sleep,
                        )
                        .await;
                }
            };

            info!("disable DeleteRetentionPolicy on account({account}), resource group({resource_group})");
            props.share_delete_retention_policy = Some(DeleteRetentionPolicy {
                enabled: false,
                days: None,
            });
            let result = self
                .management
                .set_service_properties(resource_group, account, &props)
                .await;
            self.settle(
                op,
                &Route::Management,
                resource_group,
                account,
                account,
                result,
                throttle_sleep,
            )
            .await
        })
        .await
    }

    /// Works out resource group, account, key, share and disk for a volume
    /// from its id, the request parameters and the request secrets.
    /// An unparsable volume id is tolerated when the request names the
    /// missing parts itself.
    pub async fn account_info(
        &self,
        volume_id: &str,
        secrets: &AccountSecrets,
        ctx: &RequestContext,
    ) -> Result<AccountInfo> {
        let id = decode_volume_id(volume_id).unwrap_or_else(|e| {
            warn!("parsing volumeID({volume_id}) return with error: {e}");
            VolumeId::default()
        });

        let pick = |from_ctx: &Option<String>, decoded: String| from_ctx.clone().unwrap_or(decoded);
        let mut info = AccountInfo {
            resource_group: pick(&ctx.resource_group, id.resource_group),
            account_name: pick(&ctx.storage_account, id.account_name),
            account_key: String::new(),
            share_name: pick(&ctx.share_name, id.share_name),
            disk_name: pick(&ctx.disk_name, id.disk_name),
        };
        if info.resource_group.is_empty() {
            info.resource_group = self.config.resource_group.clone();
        }

        if ctx.is_nfs() && !info.share_name.is_empty() {
            return Ok(info);
        }

        let secret_ref = SecretRef {
            name: ctx.secret_name.clone(),
            namespace: ctx.secret_namespace.clone(),
        };
        let creds = self
            .credentials
            .resolve_credentials(&info.account_name, &info.resource_group, secrets, &secret_ref)
            .await?;
        info.account_name = creds.account_name;
        info.account_key = creds.account_key;
        Ok(info)
    }

    async fn route(
        &self,
        resource_group: &str,
        account: &str,
        secrets: &AccountSecrets,
    ) -> Result<Route> {
        if !secrets.is_empty() {
            return Ok(Route::DataPlane(secrets.credentials()?));
        }
        match self.routes.plane(account) {
            ApiPlane::ManagementPlane => Ok(Route::Management),
            ApiPlane::DataPlane => {
                let creds = self
                    .credentials
                    .resolve_credentials(
                        account,
                        resource_group,
                        &AccountSecrets::none(),
                        &SecretRef::default(),
                    )
                    .await?;
                Ok(Route::DataPlane(creds))
            }
        }
    }

    async fn settle<T: Default>(
        &self,
        op: Operation,
        route: &Route,
        resource_group: &str,
        account: &str,
        target: &str,
        result: std::result::Result<T, RemoteError>,
        throttle_sleep: Duration,
    ) -> Attempt<T> {
        match decide(op, route.plane(), result) {
            Decision::Done(v) => Attempt::Done(v),
            Decision::Retry { error, throttled } => {
                warn!(
                    "{op}({target}) on account({account}) failed with error({error}), waiting for retrying"
                );
                if throttled && !throttle_sleep.is_zero() {
                    warn!("sleep {throttle_sleep:?} since {op} on account({account}) is throttled");
                    sleep(throttle_sleep).await;
                }
                Attempt::Retry(error)
            }
            Decision::SwitchToDataPlane(error) => {
                warn!(
                    "{op}({target}) on account({account}) failed with error({error}), waiting for retrying"
                );
                // the data plane needs the account key, so only switch once it resolves
                if let Err(e) = self
                    .credentials
                    .resolve_credentials(
                        account,
                        resource_group,
                        &AccountSecrets::none(),
                        &SecretRef::default(),
                    )
                    .await
                {
                    warn!("could not get key of account({account}) for data plane API: {e}");
                    return Attempt::Abort(error);
                }
                warn!("switch to use data plane API instead for account {account} since it's throttled");
                self.routes.use_data_plane(account);
                Attempt::Retry(error)
            }
            Decision::Abort(error) => Attempt::Abort(error),
        }
    }
}
