use std::fmt::Write;

use chrono::{Local, Utc};
use dial_plugin_sdk::{FunctionDescriptor, Plugin, PluginError, Schema};
use serde_json::Value;

use crate::config::ClockConfig;

pub const CURRENT_TIME: &str = "current_time";

/// Plugin exposing the wall clock as a single zero-argument function.
#[derive(Debug, Clone)]
pub struct TimePlugin {
    config: ClockConfig,
}

impl TimePlugin {
    pub fn new(config: ClockConfig) -> Self {
        Self { config }
    }

    /// Samples the clock and renders it with the configured layout plus a trailing newline.
    pub fn current_time(&self) -> Result<String, PluginError> {
        let mut out = String::new();
        let rendered = if self.config.utc {
            write!(out, "{}", Utc::now().format(&self.config.format))
        } else {
            write!(out, "{}", Local::now().format(&self.config.format))
        };
        rendered.map_err(|_| PluginError::invoke(CURRENT_TIME, "failed to format timestamp"))?;
        out.push('\n');
        Ok(out)
    }
}

impl Plugin for TimePlugin {
    const NAME: &'static str = "dial-time-plugin";

    fn init(config: &[u8]) -> Result<Self, PluginError> {
        let config = ClockConfig::parse(config)?;
        tracing::debug!(utc = config.utc, format = %config.format, "clock configured");
        Ok(Self::new(config))
    }

    fn schema(&self) -> Result<Schema, PluginError> {
        Ok(Schema::new(vec![FunctionDescriptor::new(
            CURRENT_TIME,
            "Get the current date and time",
        )]))
    }

    fn invoke(&mut self, function: &str, args: &[u8]) -> Result<Vec<u8>, PluginError> {
        match function {
            CURRENT_TIME => {
                expect_no_arguments(function, args)?;
                Ok(self.current_time()?.into_bytes())
            }
            other => Err(PluginError::UnknownFunction(other.to_string())),
        }
    }
}

/// Accepts an empty buffer or an empty JSON object.
fn expect_no_arguments(function: &str, args: &[u8]) -> Result<(), PluginError> {
    if args.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let value: Value = serde_json::from_slice(args)
        .map_err(|err| PluginError::invalid_arguments(function, err.to_string()))?;
    match value.as_object() {
        Some(map) if map.is_empty() => Ok(()),
        Some(_) => Err(PluginError::invalid_arguments(function, "takes no arguments")),
        None => Err(PluginError::invalid_arguments(function, "expected a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use dial_plugin_sdk::Status;

    use super::*;

    fn plugin(config: &str) -> TimePlugin {
        TimePlugin::init(config.as_bytes()).unwrap()
    }

    #[test]
    fn default_output_has_ctime_shape() {
        let text = plugin("").current_time().unwrap();
        assert!(text.ends_with('\n'));
        // "Www Mmm dd hh:mm:ss yyyy"
        assert_eq!(text.trim_end().len(), 24, "{text:?}");
        assert_eq!(text.split_whitespace().count(), 5, "{text:?}");
    }

    #[test]
    fn custom_format_is_honoured() {
        let text = plugin(r#"{"utc": true, "format": "%Y"}"#).current_time().unwrap();
        let year: i32 = text.trim_end().parse().unwrap();
        assert!(year >= 2024);
    }

    #[test]
    fn schema_lists_only_current_time() {
        let schema = plugin("").schema().unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), [CURRENT_TIME]);
        assert!(!schema.find(CURRENT_TIME).unwrap().takes_arguments());
    }

    #[test]
    fn empty_object_counts_as_no_arguments() {
        let mut clock = plugin("");
        assert!(clock.invoke(CURRENT_TIME, b"{}").is_ok());
        assert!(clock.invoke(CURRENT_TIME, b"").is_ok());
    }

    #[test]
    fn arguments_are_rejected() {
        let mut clock = plugin("");
        let cases: [&[u8]; 3] = [br#"{"tz": "UTC"}"#, b"[]", b"not json"];
        for args in cases {
            let err = clock.invoke(CURRENT_TIME, args).unwrap_err();
            assert_eq!(err.status(), Status::InvokeError);
        }
    }

    #[test]
    fn unknown_function() {
        let err = plugin("").invoke("nonexistent_fn", b"").unwrap_err();
        assert!(matches!(err, PluginError::UnknownFunction(ref name) if name == "nonexistent_fn"));
    }
}
