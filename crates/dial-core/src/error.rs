use dial_plugin_sdk::{RawStatus, Status};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

/// Failure observed while driving a plugin through its entry points.
#[derive(Error, Debug)]
pub enum HostError {
    /// An entry point returned a failure status.
    #[error("{operation} returned {status}: {}", .message.as_deref().unwrap_or("no diagnostic"))]
    Status {
        operation: &'static str,
        status: Status,
        message: Option<String>,
    },

    /// An entry point returned a code outside the status enumeration.
    #[error("{operation} returned undefined status code {code}")]
    UndefinedStatus {
        operation: &'static str,
        code: RawStatus,
    },

    #[error("plugin schema is not valid JSON: {0}")]
    InvalidSchema(#[from] serde_json::Error),
}

impl HostError {
    /// The decoded failure status, if the plugin returned one from the enumeration.
    pub fn status(&self) -> Option<Status> {
        match self {
            HostError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
