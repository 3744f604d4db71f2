use std::{fs, path::Path, sync::OnceLock};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bundled example configuration.
pub const EXAMPLE: &str = include_str!("../../../config/minimal.dial.toml");

/// Host configuration deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub plugin: PluginSection,
    pub calls: Vec<Call>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginSection {
    /// JSON-encoded into the init buffer; absent means an empty buffer.
    pub init: Option<Value>,
}

/// One invocation performed by `dial run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub function: String,
    /// JSON-encoded into the argument buffer; absent means an empty buffer.
    #[serde(default)]
    pub args: Option<Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parses TOML after `${VAR}` / `${VAR:default}` interpolation.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let expanded = interpolate_env(raw);
        Ok(toml::from_str::<Config>(&expanded)?)
    }

    /// Validates structural invariants and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        if let Some(init) = &self.plugin.init {
            if !init.is_object() {
                bail!("plugin.init must be a table");
            }
        }
        for (index, call) in self.calls.iter().enumerate() {
            call.validate()
                .with_context(|| format!("invalid entry #{} in [[calls]]", index + 1))?;
        }
        tracing::debug!(calls = self.calls.len(), "configuration validated");
        Ok(())
    }

    pub fn init_args(&self) -> Result<Vec<u8>> {
        encode(self.plugin.init.as_ref()).context("failed to encode plugin.init")
    }
}

impl Call {
    pub fn validate(&self) -> Result<()> {
        if self.function.trim().is_empty() {
            bail!("function name must not be empty");
        }
        Ok(())
    }

    pub fn args_bytes(&self) -> Result<Vec<u8>> {
        encode(self.args.as_ref())
            .with_context(|| format!("failed to encode arguments for `{}`", self.function))
    }
}

fn encode(value: Option<&Value>) -> Result<Vec<u8>> {
    match value {
        Some(value) => Ok(serde_json::to_vec(value)?),
        None => Ok(Vec::new()),
    }
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
pub fn interpolate_env(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = RE.get_or_init(|| Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}").unwrap());
    let result = regex.replace_all(input, |caps: &regex::Captures| {
        let key = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    });
    result.into_owned()
}
