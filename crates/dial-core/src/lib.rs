pub mod config;
pub mod error;
pub mod host;

pub use error::HostError;
pub use host::{PluginInstance, ResultBuffer};

/// Returns the crate version baked in at compile time.
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
