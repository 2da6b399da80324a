//! Typed views over the string maps handed in by the plugin layer.
//!
//! The plugin protocol passes parameters as `map<string,string>` with keys
//! in arbitrary case. They are parsed once here; everything past this
//! module works with the typed structs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const RESOURCE_GROUP_FIELD: &str = "resourcegroup";
pub const STORAGE_ACCOUNT_FIELD: &str = "storageaccount";
pub const SHARE_NAME_FIELD: &str = "sharename";
pub const DISK_NAME_FIELD: &str = "diskname";
pub const PROTOCOL_FIELD: &str = "protocol";
pub const SECRET_NAMESPACE_FIELD: &str = "secretnamespace";
pub const SECRET_NAME_FIELD: &str = "secretname";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Smb,
    Nfs,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smb" => Ok(Protocol::Smb),
            "nfs" => Ok(Protocol::Nfs),
            other => Err(format!("protocol {other:?} is not supported")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Smb => f.write_str("smb"),
            Protocol::Nfs => f.write_str("nfs"),
        }
    }
}

/// An empty protocol means the default one.
pub fn is_supported_protocol(protocol: &str) -> bool {
    protocol.is_empty() || protocol.parse::<Protocol>().is_ok()
}

/// Looks `field` up in `params` ignoring the case of the keys.
pub fn lookup<'a>(params: &'a HashMap<String, String>, field: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(field))
        .map(|(_, v)| v.as_str())
}

/// Per-request parameters relevant to locating a share and its key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub resource_group: Option<String>,
    pub storage_account: Option<String>,
    pub share_name: Option<String>,
    pub disk_name: Option<String>,
    /// Unparsed; an unknown value simply is not NFS.
    pub protocol: Option<String>,
    pub secret_namespace: Option<String>,
    pub secret_name: Option<String>,
}

impl RequestContext {
    pub fn from_map(params: &HashMap<String, String>) -> Self {
        let get = |field| lookup(params, field).map(str::to_string);
        Self {
            resource_group: get(RESOURCE_GROUP_FIELD),
            storage_account: get(STORAGE_ACCOUNT_FIELD),
            share_name: get(SHARE_NAME_FIELD),
            disk_name: get(DISK_NAME_FIELD),
            protocol: get(PROTOCOL_FIELD),
            secret_namespace: get(SECRET_NAMESPACE_FIELD),
            secret_name: get(SECRET_NAME_FIELD),
        }
    }

    pub fn is_nfs(&self) -> bool {
        self.protocol
            .as_deref()
            .and_then(|p| p.parse::<Protocol>().ok())
            == Some(Protocol::Nfs)
    }
}
