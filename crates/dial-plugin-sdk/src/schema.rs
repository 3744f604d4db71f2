use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::PluginError;

/// One invocable function as advertised by `dial_plugin_schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the argument buffer.
    #[serde(default = "no_parameters")]
    pub parameters: Value,
}

/// Parameter schema of a function that takes no arguments.
pub fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: no_parameters(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn takes_arguments(&self) -> bool {
        self.parameters
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|props| !props.is_empty())
    }
}

/// The JSON array of function descriptors a plugin hands to its host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    functions: Vec<FunctionDescriptor>,
}

impl Schema {
    pub fn new(functions: Vec<FunctionDescriptor>) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    pub fn find(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn to_json(&self) -> Result<String, PluginError> {
        serde_json::to_string(self).map_err(|err| PluginError::Schema(err.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl FromIterator<FunctionDescriptor> for Schema {
    fn from_iter<I: IntoIterator<Item = FunctionDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
