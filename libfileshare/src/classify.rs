//! Maps remote error messages onto the retry policy classes.

use std::fmt;
use std::str::FromStr;

use crate::backoff::Attempt;
use crate::error::{RemoteError, ShareError};

pub const ACCOUNT_NOT_PROVISIONED: &str = "StorageAccountIsNotProvisioned";
pub const TOO_MANY_REQUESTS: &str = "TooManyRequests";
pub const SHARE_BEING_DELETED: &str = "The specified share is being deleted";
pub const CLIENT_THROTTLED: &str = "client throttled";

/// Account limit reached, as reported by the management API.
pub const ACCOUNT_LIMIT_EXCEED_MANAGEMENT_API: &str =
    "TotalSharesProvisionedCapacityExceedsAccountLimit";
/// The data plane reports a full account on create this way.
pub const ACCOUNT_LIMIT_EXCEED_DATA_PLANE_API: &str = "specified share does not exist";

const RETRIABLE_ERRORS: [&str; 4] = [
    ACCOUNT_NOT_PROVISIONED,
    TOO_MANY_REQUESTS,
    SHARE_BEING_DELETED,
    CLIENT_THROTTLED,
];

const NOT_FOUND_ERRORS: [&str; 4] = [
    "ShareNotFound",
    "ResourceNotFound",
    "StorageAccountNotFound",
    "share does not exist",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateShare,
    DeleteShare,
    ResizeShare,
    GetShare,
    RemoveTag,
    DisableRetentionPolicy,
}

impl Operation {
    /// Operations for which an absent resource is an answer rather than a
    /// failure: deletes succeed, reads report nothing.
    pub fn absent_is_done(self) -> bool {
        matches!(
            self,
            Operation::DeleteShare | Operation::RemoveTag | Operation::GetShare
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::CreateShare => "CreateFileShare",
            Operation::DeleteShare => "DeleteFileShare",
            Operation::ResizeShare => "ResizeFileShare",
            Operation::GetShare => "GetFileShare",
            Operation::RemoveTag => "RemoveStorageAccountTag",
            Operation::DisableRetentionPolicy => "DisableDeleteRetentionPolicy",
        };
        f.write_str(s)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Operation::CreateShare),
            "delete" => Ok(Operation::DeleteShare),
            "resize" => Ok(Operation::ResizeShare),
            "get" => Ok(Operation::GetShare),
            "remove-tag" => Ok(Operation::RemoveTag),
            "disable-retention" => Ok(Operation::DisableRetentionPolicy),
            other => Err(format!("unknown operation {other:?}")),
        }
    }
}

/// Which API surface served the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiPlane {
    #[default]
    ManagementPlane,
    DataPlane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ThrottleRetriable,
    /// Throttled on the management plane while deleting; later calls for the
    /// account should go through the data plane.
    ThrottleFallback,
    QuotaConflict,
    NotFound,
    Fatal,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.contains(&needle.to_lowercase())
}

pub fn classify(op: Operation, plane: ApiPlane, message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    if contains_ignore_case(&msg, ACCOUNT_LIMIT_EXCEED_MANAGEMENT_API)
        || (op == Operation::CreateShare
            && contains_ignore_case(&msg, ACCOUNT_LIMIT_EXCEED_DATA_PLANE_API))
    {
        return ErrorClass::QuotaConflict;
    }
    if op == Operation::DeleteShare
        && plane == ApiPlane::ManagementPlane
        && contains_ignore_case(&msg, TOO_MANY_REQUESTS)
    {
        return ErrorClass::ThrottleFallback;
    }
    if RETRIABLE_ERRORS
        .iter()
        .any(|e| contains_ignore_case(&msg, e))
    {
        return ErrorClass::ThrottleRetriable;
    }
    if NOT_FOUND_ERRORS
        .iter()
        .any(|e| contains_ignore_case(&msg, e))
    {
        return ErrorClass::NotFound;
    }
    ErrorClass::Fatal
}

/// Whether a retriable error also warrants the fixed throttling sleep.
pub fn is_throttled(message: &str) -> bool {
    let msg = message.to_lowercase();
    contains_ignore_case(&msg, TOO_MANY_REQUESTS) || contains_ignore_case(&msg, CLIENT_THROTTLED)
}

impl ErrorClass {
    /// The error handed back to the caller once retrying stops.
    pub fn into_error(self, message: &str) -> ShareError {
        let message = message.to_string();
        match self {
            ErrorClass::ThrottleRetriable | ErrorClass::ThrottleFallback => {
                ShareError::RemoteThrottled(message)
            }
            ErrorClass::QuotaConflict => ShareError::RemoteQuotaExceeded(message),
            ErrorClass::NotFound => ShareError::RemoteNotFound(message),
            ErrorClass::Fatal => ShareError::RemoteFatal(message),
        }
    }
}

/// What to do with the result of one remote call.
#[derive(Debug)]
pub enum Decision<T> {
    Done(T),
    Retry { error: ShareError, throttled: bool },
    /// Retry, routing the account through the data plane from now on.
    SwitchToDataPlane(ShareError),
    Abort(ShareError),
}

impl<T> Decision<T> {
    pub fn into_attempt(self) -> Attempt<T> {
        match self {
            Decision::Done(v) => Attempt::Done(v),
            Decision::Retry { error, .. } | Decision::SwitchToDataPlane(error) => {
                Attempt::Retry(error)
            }
            Decision::Abort(e) => Attempt::Abort(e),
        }
    }
}

/// Turns a remote result into a retry decision. An absent resource yields
/// `T::default()` for operations where that counts as done.
pub fn decide<T: Default>(
    op: Operation,
    plane: ApiPlane,
    result: Result<T, RemoteError>,
) -> Decision<T> {
    let err = match result {
        Ok(v) => return Decision::Done(v),
        Err(e) => e,
    };
    let class = classify(op, plane, &err.message);
    match class {
        ErrorClass::ThrottleRetriable => Decision::Retry {
            throttled: is_throttled(&err.message),
            error: class.into_error(&err.message),
        },
        ErrorClass::ThrottleFallback => {
            Decision::SwitchToDataPlane(class.into_error(&err.message))
        }
        ErrorClass::NotFound if op.absent_is_done() => Decision::Done(T::default()),
        ErrorClass::NotFound | ErrorClass::QuotaConflict | ErrorClass::Fatal => {
            Decision::Abort(class.into_error(&err.message))
        }
    }
}
