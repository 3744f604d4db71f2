//! Reference Dial plugin: reports the current date and time.
//!
//! Builds as a `cdylib` exporting the `dial_plugin_*` entry points, and as an `rlib`
//! so hosts and tests can link it directly through [`dial_plugin_vtable`].

pub mod clock;
pub mod config;

pub use clock::{TimePlugin, CURRENT_TIME};
pub use config::ClockConfig;

dial_plugin_sdk::export_plugin!(TimePlugin);
