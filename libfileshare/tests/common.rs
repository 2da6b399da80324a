#![allow(dead_code)]

use async_trait::async_trait;
use libfileshare::client::{
    DataPlaneClient, FileServiceProperties, ManagementClient, SecretStore, ShareOptions,
    ShareProperties,
};
use libfileshare::config::{BackoffConfig, DriverConfig, ThrottlingConfig};
use libfileshare::credential::AccountCredentials;
use libfileshare::error::RemoteError;
use libfileshare::manager::ShareManager;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Call counts and queued failures per method name.
#[derive(Default)]
pub struct Script {
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, VecDeque<String>>>,
}

impl Script {
    pub fn fail_next(&self, method: &'static str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(message.to_string());
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) -> Result<(), RemoteError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            Some(message) => Err(RemoteError::new(message)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeManagement {
    pub script: Script,
    pub account_key: Mutex<Option<String>>,
    pub quota: Mutex<Option<u64>>,
    pub service_properties: Mutex<Option<FileServiceProperties>>,
    pub written_properties: Mutex<Vec<FileServiceProperties>>,
    pub created: Mutex<Vec<ShareOptions>>,
}

impl FakeManagement {
    pub fn with_key(key: &str) -> Self {
        let fake = Self::default();
        *fake.account_key.lock().unwrap() = Some(key.to_string());
        fake
    }
}

#[async_trait]
impl ManagementClient for FakeManagement {
    async fn create_file_share(
        &self,
        _resource_group: &str,
        _account: &str,
        share: &ShareOptions,
    ) -> Result<(), RemoteError> {
        self.script.record("create_file_share")?;
        self.created.lock().unwrap().push(share.clone());
        Ok(())
    }

    async fn delete_file_share(
        &self,
        _resource_group: &str,
        _account: &str,
        _share_name: &str,
    ) -> Result<(), RemoteError> {
        self.script.record("delete_file_share")
    }

    async fn resize_file_share(
        &self,
        _resource_group: &str,
        _account: &str,
        _share_name: &str,
        _size_gib: u64,
    ) -> Result<(), RemoteError> {
        self.script.record("resize_file_share")
    }

    async fn get_file_share(
        &self,
        _resource_group: &str,
        _account: &str,
        _share_name: &str,
    ) -> Result<ShareProperties, RemoteError> {
        self.script.record("get_file_share")?;
        Ok(ShareProperties {
            quota_gib: *self.quota.lock().unwrap(),
        })
    }

    async fn get_service_properties(
        &self,
        _resource_group: &str,
        _account: &str,
    ) -> Result<Option<FileServiceProperties>, RemoteError> {
        self.script.record("get_service_properties")?;
        Ok(self.service_properties.lock().unwrap().clone())
    }

    async fn set_service_properties(
        &self,
        _resource_group: &str,
        _account: &str,
        properties: &FileServiceProperties,
    ) -> Result<(), RemoteError> {
        self.script.record("set_service_properties")?;
        self.written_properties
            .lock()
            .unwrap()
            .push(properties.clone());
        Ok(())
    }

    async fn remove_account_tag(
        &self,
        _resource_group: &str,
        _account: &str,
        _key: &str,
    ) -> Result<(), RemoteError> {
        self.script.record("remove_account_tag")
    }

    async fn get_account_key(
        &self,
        account: &str,
        _resource_group: &str,
    ) -> Result<String, RemoteError> {
        self.script.record("get_account_key")?;
        self.account_key
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteError::new(format!("StorageAccountNotFound: {account}")))
    }
}

#[derive(Default)]
pub struct FakeDataPlane {
    pub script: Script,
    pub quota: Mutex<Option<u64>>,
    /// Credentials seen by each call, in order.
    pub seen: Mutex<Vec<AccountCredentials>>,
}

impl FakeDataPlane {
    fn record(&self, method: &'static str, creds: &AccountCredentials) -> Result<(), RemoteError> {
        self.seen.lock().unwrap().push(creds.clone());
        self.script.record(method)
    }
}

#[async_trait]
impl DataPlaneClient for FakeDataPlane {
    async fn create_file_share(
        &self,
        creds: &AccountCredentials,
        _share: &ShareOptions,
    ) -> Result<(), RemoteError> {
        self.record("create_file_share", creds)
    }

    async fn delete_file_share(
        &self,
        creds: &AccountCredentials,
        _share_name: &str,
    ) -> Result<(), RemoteError> {
        self.record("delete_file_share", creds)
    }

    async fn resize_file_share(
        &self,
        creds: &AccountCredentials,
        _share_name: &str,
        _size_gib: u64,
    ) -> Result<(), RemoteError> {
        self.record("resize_file_share", creds)
    }

    async fn share_quota(
        &self,
        creds: &AccountCredentials,
        _share_name: &str,
    ) -> Result<Option<u64>, RemoteError> {
        self.record("share_quota", creds)?;
        Ok(*self.quota.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeSecretStore {
    secrets: Mutex<HashMap<(String, String), HashMap<String, Vec<u8>>>>,
    pub lookups: Mutex<Vec<(String, String)>>,
}

impl FakeSecretStore {
    pub fn insert(&self, name: &str, namespace: &str, key: &str) {
        self.secrets.lock().unwrap().insert(
            (name.to_string(), namespace.to_string()),
            HashMap::from([(
                "azurestorageaccountkey".to_string(),
                key.as_bytes().to_vec(),
            )]),
        );
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<HashMap<String, Vec<u8>>, RemoteError> {
        let id = (name.to_string(), namespace.to_string());
        self.lookups.lock().unwrap().push(id.clone());
        self.secrets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("secrets \"{name}\" not found")))
    }
}

/// Short delays so retries finish quickly under paused time.
pub fn test_config() -> DriverConfig {
    DriverConfig {
        resource_group: "default-rg".to_string(),
        subscription_id: "sub".to_string(),
        backoff: BackoffConfig {
            duration_ms: 10,
            factor: 2.0,
            jitter: 0.0,
            steps: 4,
            cap_ms: None,
        },
        throttling: ThrottlingConfig {
            file_op_sleep_secs: 1,
            account_op_sleep_secs: 1,
        },
        ..Default::default()
    }
}

pub struct Fixture {
    pub manager: ShareManager,
    pub management: Arc<FakeManagement>,
    pub data_plane: Arc<FakeDataPlane>,
    pub secret_store: Arc<FakeSecretStore>,
}

pub fn fixture(management: FakeManagement) -> Fixture {
    fixture_with(test_config(), management)
}

pub fn fixture_with(config: DriverConfig, management: FakeManagement) -> Fixture {
    let management = Arc::new(management);
    let data_plane = Arc::new(FakeDataPlane::default());
    let secret_store = Arc::new(FakeSecretStore::default());
    let manager = ShareManager::new(
        config,
        management.clone(),
        data_plane.clone(),
        Some(secret_store.clone()),
    );
    Fixture {
        manager,
        management,
        data_plane,
        secret_store,
    }
}
