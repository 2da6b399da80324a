//! Compound volume and snapshot identifiers.
//!
//! A volume id looks like `rg#account#share[#disk]`, a snapshot id appends a
//! fifth timestamp field: `rg#account#share#disk#2019-08-22T07:17:53.0000000Z`.
//! Only the number of fields is checked, never their contents.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ShareError};

pub const SEPARATOR: &str = "#";

const VOLUME_ID_MIN_FIELDS: usize = 3;
const SNAPSHOT_ID_MIN_FIELDS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeId {
    pub resource_group: String,
    pub account_name: String,
    pub share_name: String,
    /// Empty when the volume is the share itself.
    pub disk_name: String,
}

impl VolumeId {
    pub fn new(
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
        share_name: impl Into<String>,
        disk_name: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            account_name: account_name.into(),
            share_name: share_name.into(),
            disk_name: disk_name.into(),
        }
    }

    /// Snapshot id for this volume taken at `timestamp`.
    pub fn snapshot_id(&self, timestamp: &str) -> String {
        [
            self.resource_group.as_str(),
            self.account_name.as_str(),
            self.share_name.as_str(),
            self.disk_name.as_str(),
            timestamp,
        ]
        .join(SEPARATOR)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.resource_group, self.account_name, self.share_name
        )?;
        if !self.disk_name.is_empty() {
            write!(f, "{SEPARATOR}{}", self.disk_name)?;
        }
        Ok(())
    }
}

impl FromStr for VolumeId {
    type Err = ShareError;

    fn from_str(id: &str) -> Result<Self> {
        let segments: Vec<&str> = id.split(SEPARATOR).collect();
        if segments.len() < VOLUME_ID_MIN_FIELDS {
            return Err(ShareError::MalformedIdentifier {
                id: id.to_string(),
                reason: "should at least contain two #".to_string(),
            });
        }
        Ok(Self {
            resource_group: segments[0].to_string(),
            account_name: segments[1].to_string(),
            share_name: segments[2].to_string(),
            disk_name: segments.get(3).copied().unwrap_or_default().to_string(),
        })
    }
}

pub fn encode_volume_id(
    resource_group: &str,
    account_name: &str,
    share_name: &str,
    disk_name: &str,
) -> String {
    VolumeId::new(resource_group, account_name, share_name, disk_name).to_string()
}

pub fn decode_volume_id(id: &str) -> Result<VolumeId> {
    id.parse()
}

/// Returns the timestamp field of a snapshot id verbatim.
pub fn decode_snapshot_id(id: &str) -> Result<String> {
    let segments: Vec<&str> = id.split(SEPARATOR).collect();
    if segments.len() < SNAPSHOT_ID_MIN_FIELDS {
        return Err(ShareError::MalformedIdentifier {
            id: id.to_string(),
            reason: "should at least contain four #".to_string(),
        });
    }
    Ok(segments[4].to_string())
}
