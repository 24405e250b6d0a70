use super::EntityConfig;
use crate::mapping::tranche::TrancheOverrideManager;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One tranche: a batch of books sharing schedule, imprint and overrides.
///
/// Keys without a dedicated field (`territorial_rights`, `file_path_templates`,
/// `annotation_boilerplate`, `required_bisac_subject`, ...) are kept in
/// `values` and act as tranche-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrancheConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub tranche_info: Map<String, Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub publisher: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub imprint: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub field_overrides: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub append_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blank_fields: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub field_mappings: Map<String, Value>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl TrancheConfig {
    /// Override rules for wrapping a registry, `None` when the tranche
    /// declares none.
    pub fn override_manager(&self) -> Option<TrancheOverrideManager> {
        let mut config = self.values.clone();
        config.insert("field_overrides".into(), Value::Object(self.field_overrides.clone()));
        config.insert("append_fields".into(), self.append_fields.iter().cloned().map(Value::String).collect());
        config.insert("blank_fields".into(), self.blank_fields.iter().cloned().map(Value::String).collect());
        let manager = TrancheOverrideManager::from_config(&config);
        (!manager.is_empty()).then_some(manager)
    }
}

impl EntityConfig for TrancheConfig {
    const KIND: &'static str = "tranches";

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
