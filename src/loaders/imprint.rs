use super::EntityConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An imprint: a brand under a publisher with its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImprintConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Name of the owning publisher config.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub publisher: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub imprint_info: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub field_mappings: Map<String, Value>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl EntityConfig for ImprintConfig {
    const KIND: &'static str = "imprints";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn defaults(&self) -> Map<String, Value> {
        self.values.clone()
    }

    fn field_mappings(&self) -> &Map<String, Value> {
        &self.field_mappings
    }
}
