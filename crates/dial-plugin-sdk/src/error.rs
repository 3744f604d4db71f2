//! Errors raised by plugin code and their mapping onto ABI status codes.

use thiserror::Error;

use crate::abi::Status;

/// Failure reported by a [`crate::Plugin`]. Each variant maps to exactly one [`Status`].
#[derive(Error, Debug)]
pub enum PluginError {
    /// A result buffer could not be allocated.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// The init configuration was rejected.
    #[error("initialization failed: {0}")]
    Init(String),

    /// The function list could not be described.
    #[error("schema unavailable: {0}")]
    Schema(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("invalid arguments for `{function}`: {reason}")]
    InvalidArguments { function: String, reason: String },

    /// The function was found and its arguments accepted, but it failed.
    #[error("`{function}` failed: {reason}")]
    Invoke { function: String, reason: String },

    /// Plugin code panicked; the panic was stopped at the C boundary.
    #[error("plugin panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PluginError {
    pub fn invalid_arguments(function: &str, reason: impl Into<String>) -> Self {
        PluginError::InvalidArguments {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invoke(function: &str, reason: impl Into<String>) -> Self {
        PluginError::Invoke {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            PluginError::OutOfMemory(_) => Status::OutOfMemory,
            PluginError::Init(_) => Status::InitError,
            PluginError::Schema(_) => Status::SchemaError,
            PluginError::UnknownFunction(_)
            | PluginError::InvalidArguments { .. }
            | PluginError::Invoke { .. } => Status::InvokeError,
            PluginError::Panicked(_) | PluginError::Other(_) => Status::UnknownError,
        }
    }
}
