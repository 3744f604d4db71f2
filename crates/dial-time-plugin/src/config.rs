use chrono::format::{Item, StrftimeItems};
use dial_plugin_sdk::PluginError;
use serde::{Deserialize, Serialize};

/// `ctime(3)` layout, without the trailing newline.
pub const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Init configuration, passed as a JSON object in the init buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Report UTC instead of the local time zone.
    pub utc: bool,
    /// strftime-style layout of the returned timestamp.
    pub format: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc: false,
            format: CTIME_FORMAT.to_string(),
        }
    }
}

impl ClockConfig {
    /// Parses the init buffer. An empty or all-whitespace buffer selects the defaults.
    pub fn parse(raw: &[u8]) -> Result<Self, PluginError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_slice(raw)
            .map_err(|err| PluginError::Init(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PluginError> {
        if self.format.trim().is_empty() {
            return Err(PluginError::Init("format must not be empty".into()));
        }
        if StrftimeItems::new(&self.format).any(|item| matches!(item, Item::Error)) {
            return Err(PluginError::Init(format!(
                "invalid time format `{}`",
                self.format
            )));
        }
        Ok(())
    }
}
