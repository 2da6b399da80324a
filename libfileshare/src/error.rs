/// Failure reported by a remote collaborator (management plane, data plane
/// or secret store). Only the message is inspected by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("error parsing id {id:?}: {reason}")]
    MalformedIdentifier { id: String, reason: String },
    #[error("could not find {field} field in secrets")]
    MissingCredentialField { field: &'static str },
    #[error("remote throttled: {0}")]
    RemoteThrottled(String),
    #[error("account limit exceeded: {0}")]
    RemoteQuotaExceeded(String),
    #[error("not found: {0}")]
    RemoteNotFound(String),
    #[error("{0}")]
    RemoteFatal(String),
    #[error("could not get account key for {account}: {reason}")]
    SecretStore { account: String, reason: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T, E = ShareError> = std::result::Result<T, E>;
