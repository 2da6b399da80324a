use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::credential::DEFAULT_SECRET_NAMESPACE;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    // used when neither the volume id nor the request names one
    pub resource_group: String,
    pub subscription_id: String,
    pub network_resource_subscription_id: Option<String>,
    pub vnet_resource_group: Option<String>,
    pub vnet_name: String,
    pub subnet_name: String,
    pub backoff: BackoffConfig,
    pub throttling: ThrottlingConfig,
    pub cache: CacheConfig,
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub duration_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub steps: u32,
    pub cap_ms: Option<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let b = Backoff::default();
        Self {
            duration_ms: b.duration.as_millis() as u64,
            factor: b.factor,
            jitter: b.jitter,
            steps: b.steps,
            cap_ms: b.cap.map(|c| c.as_millis() as u64),
        }
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(c: &BackoffConfig) -> Self {
        Backoff {
            duration: Duration::from_millis(c.duration_ms),
            factor: c.factor,
            jitter: c.jitter,
            steps: c.steps,
            cap: c.cap_ms.map(Duration::from_millis),
        }
    }
}

/// Fixed pauses applied when the remote side reports throttling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThrottlingConfig {
    /// Share create/resize.
    pub file_op_sleep_secs: u64,
    /// Account updates such as tag removal.
    pub account_op_sleep_secs: u64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            file_op_sleep_secs: 180,
            account_op_sleep_secs: 16,
        }
    }
}

impl ThrottlingConfig {
    pub fn file_op_sleep(&self) -> Duration {
        Duration::from_secs(self.file_op_sleep_secs)
    }

    pub fn account_op_sleep(&self) -> Duration {
        Duration::from_secs(self.account_op_sleep_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub remove_tag_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remove_tag_ttl_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecretsConfig {
    pub default_namespace: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_SECRET_NAMESPACE.to_string(),
        }
    }
}

impl DriverConfig {
    /// Resource id of the subnet NFS shares are exposed to.
    pub fn subnet_resource_id(&self) -> String {
        let subscription = self
            .network_resource_subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.subscription_id.as_str());
        let rg = self
            .vnet_resource_group
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.resource_group.as_str());
        format!(
            "/subscriptions/{subscription}/resourceGroups/{rg}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
            self.vnet_name, self.subnet_name
        )
    }
}

pub fn load_config(path: &str) -> Result<DriverConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: DriverConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_with_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
resource_group: rg
subscription_id: sub
vnet_name: vnet
subnet_name: subnet
backoff:
  duration_ms: 100
  steps: 3
throttling:
  file_op_sleep_secs: 1
"#
        )?;

        let cfg = load_config(file.path().to_str().unwrap())?;
        assert_eq!(cfg.resource_group, "rg");
        assert_eq!(cfg.backoff.duration_ms, 100);
        assert_eq!(cfg.backoff.steps, 3);
        assert_eq!(cfg.backoff.factor, 1.5);
        assert_eq!(cfg.throttling.file_op_sleep_secs, 1);
        assert_eq!(cfg.throttling.account_op_sleep_secs, 16);
        assert_eq!(cfg.cache.remove_tag_ttl_secs, 5);
        assert_eq!(cfg.secrets.default_namespace, "default");

        let b = Backoff::from(&cfg.backoff);
        assert_eq!(b.duration, Duration::from_millis(100));
        assert_eq!(b.steps, 3);
        Ok(())
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/fileshare.yaml").is_err());
    }

    #[test]
    fn test_subnet_resource_id() {
        let mut cfg = DriverConfig {
            resource_group: "rg".into(),
            subscription_id: "sub".into(),
            vnet_name: "vnet".into(),
            subnet_name: "subnet".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.subnet_resource_id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/subnet"
        );

        cfg.network_resource_subscription_id = Some("netsub".into());
        cfg.vnet_resource_group = Some("netrg".into());
        assert_eq!(
            cfg.subnet_resource_id(),
            "/subscriptions/netsub/resourceGroups/netrg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/subnet"
        );
    }
}
