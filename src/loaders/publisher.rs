use super::EntityConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A publisher and the defaults shared by all of its imprints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imprints: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub publisher_info: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub field_mappings: Map<String, Value>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl EntityConfig for PublisherConfig {
    const KIND: &'static str = "publishers";

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_exclude_structural_keys() {
        let p: PublisherConfig = serde_json::from_value(json!({
            "imprints": ["xynapse_traces"],
            "field_mappings": {"LSI FlexField1": "default:Nimble"},
            "lightning_source_account": "6024045"
        }))
        .unwrap();
        assert_eq!(p.imprints, vec!["xynapse_traces".to_string()]);
        let defaults = p.defaults();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults["lightning_source_account"], json!("6024045"));
    }
}
