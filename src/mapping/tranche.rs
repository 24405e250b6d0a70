//! Tranche-level overrides layered over the registry.
//!
//! A tranche configuration can replace a column (`field_overrides`), append
//! to it (`append_fields`), or force it empty (`blank_fields`). The override
//! is applied by wrapping every registered strategy, so it takes effect no
//! matter which layer produced the base value.

use super::basic::DefaultMappingStrategy;
use super::{FieldMappingRegistry, MappingContext, MappingStrategy, StrategyLayer};
use crate::config::value_as_text;
use crate::error::MappingError;
use crate::metadata::{normalize_key, CodexMetadata, MetadataField, UnknownField};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves a column from configuration first.
///
/// Order: multi-level configuration under the column name, then under its
/// snake-case form, then the ad-hoc config, then the metadata field of the
/// same name, then the fallback.
pub struct TrancheOverrideStrategy {
    key: String,
    metadata_field: Option<MetadataField>,
    fallback: String,
}

impl TrancheOverrideStrategy {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let metadata_field = key.parse().ok();
        Self {
            key,
            metadata_field,
            fallback: String::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

#[async_trait]
impl MappingStrategy for TrancheOverrideStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let snake = normalize_key(&self.key);
        if let Some(value) = context.lookup_str(&self.key).or_else(|| context.lookup_str(&snake)) {
            return Ok(value);
        }
        if let Some(field) = self.metadata_field {
            let value = metadata.get(field);
            if !value.trim().is_empty() {
                return Ok(value);
            }
        }
        Ok(self.fallback.clone())
    }
}

/// Tranche override rules for one tranche.
#[derive(Debug, Clone, Default)]
pub struct TrancheOverrideManager {
    /// normalized column name -> (column name as configured, override value)
    overrides: HashMap<String, (String, String)>,
    append: HashSet<String>,
    blank: HashSet<String>,
    separator: String,
}

impl TrancheOverrideManager {
    pub fn new() -> Self {
        Self {
            separator: " ".to_string(),
            ..Self::default()
        }
    }

    /// Read `field_overrides`, `append_fields`, `blank_fields` and
    /// `append_separator` from a tranche configuration object.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let mut manager = Self::new();
        if let Some(overrides) = config.get("field_overrides").and_then(Value::as_object) {
            for (field, value) in overrides {
                if let Some(text) = value_as_text(value) {
                    manager = manager.with_override(field, text);
                }
            }
        }
        let names = |key: &str| -> Vec<String> {
            config
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };
        for field in names("append_fields") {
            manager = manager.with_append(&field);
        }
        for field in names("blank_fields") {
            manager = manager.with_blank(&field);
        }
        if let Some(sep) = config.get("append_separator").and_then(Value::as_str) {
            manager.separator = sep.to_string();
        }
        manager
    }

    pub fn with_override(mut self, field: &str, value: impl Into<String>) -> Self {
        self.overrides
            .insert(normalize_key(field), (field.to_string(), value.into()));
        self
    }

    pub fn with_append(mut self, field: &str) -> Self {
        self.append.insert(normalize_key(field));
        self
    }

    pub fn with_blank(mut self, field: &str) -> Self {
        self.blank.insert(normalize_key(field));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.blank.is_empty()
    }

    pub fn is_blank(&self, field: &str) -> bool {
        self.blank.contains(&normalize_key(field))
    }

    pub fn override_for(&self, field: &str) -> Option<&str> {
        self.overrides
            .get(&normalize_key(field))
            .map(|(_, value)| value.as_str())
    }

    /// Column names with an override, as configured.
    pub fn overridden_fields(&self) -> impl Iterator<Item = &str> {
        self.overrides.values().map(|(name, _)| name.as_str())
    }

    /// Apply the rules for `field` to a base value.
    pub fn apply(&self, field: &str, base: String) -> String {
        let key = normalize_key(field);
        if self.blank.contains(&key) {
            return String::new();
        }
        match self.overrides.get(&key) {
            Some((_, value)) if self.append.contains(&key) => {
                if base.trim().is_empty() {
                    value.clone()
                } else {
                    format!("{}{}{}", base, self.separator, value)
                }
            }
            Some((_, value)) => value.clone(),
            None => base,
        }
    }
}

/// Applies tranche overrides around another strategy.
pub struct TrancheOverrideWrapper {
    field_name: String,
    inner: Arc<dyn MappingStrategy>,
    manager: Arc<TrancheOverrideManager>,
}

impl TrancheOverrideWrapper {
    pub fn new(field_name: impl Into<String>, inner: Arc<dyn MappingStrategy>, manager: Arc<TrancheOverrideManager>) -> Self {
        Self {
            field_name: field_name.into(),
            inner,
            manager,
        }
    }

    fn replaces(&self) -> bool {
        self.manager.override_for(&self.field_name).is_some()
            && !self.manager.append.contains(&normalize_key(&self.field_name))
    }
}

#[async_trait]
impl MappingStrategy for TrancheOverrideWrapper {
    fn validate_input(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> bool {
        // overrides and blanks apply whatever the base strategy thinks of the input
        if self.manager.is_blank(&self.field_name) || self.manager.override_for(&self.field_name).is_some() {
            return true;
        }
        self.inner.validate_input(metadata, context)
    }

    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        if self.manager.is_blank(&self.field_name) || self.replaces() {
            return Ok(self.manager.apply(&self.field_name, String::new()));
        }
        let base = if self.inner.validate_input(metadata, context) {
            self.inner.map_field(metadata, context).await?
        } else {
            String::new()
        };
        Ok(self.manager.apply(&self.field_name, base))
    }
}

/// Wrap every registered strategy with `manager`'s overrides. Overridden
/// columns that had no strategy are registered at the tranche-aware layer.
pub fn wrap_registry_with_tranche_overrides(registry: &mut FieldMappingRegistry, manager: Arc<TrancheOverrideManager>) {
    if manager.is_empty() {
        debug!("No tranche overrides to apply");
        return;
    }
    registry.decorate(|name, strategy| -> Arc<dyn MappingStrategy> {
        Arc::new(TrancheOverrideWrapper::new(name, strategy, Arc::clone(&manager)))
    });

    let missing: Vec<String> = manager
        .overridden_fields()
        .filter(|f| !registry.has_strategy(f))
        .map(str::to_string)
        .collect();
    for field in missing {
        let wrapper = TrancheOverrideWrapper::new(&field, Arc::new(DefaultMappingStrategy::blank()), Arc::clone(&manager));
        registry.register_layered(StrategyLayer::TrancheAware, field, Arc::new(wrapper));
    }
    info!("Applied tranche overrides to {} columns", registry.len());
}

/// Series name or number, from the book first and the tranche second.
pub struct TrancheAwareSeriesStrategy {
    field: MetadataField,
    config_key: &'static str,
}

impl TrancheAwareSeriesStrategy {
    pub fn name() -> Self {
        Self {
            field: MetadataField::SeriesName,
            config_key: "series_name",
        }
    }

    pub fn number() -> Self {
        Self {
            field: MetadataField::SeriesNumber,
            config_key: "series_number",
        }
    }

    /// Strategy for a named metadata field.
    pub fn for_field(name: &str) -> Result<Self, UnknownField> {
        match name.parse::<MetadataField>()? {
            MetadataField::SeriesNumber => Ok(Self::number()),
            MetadataField::SeriesName => Ok(Self::name()),
            _ => Err(UnknownField(name.to_string())),
        }
    }
}

#[async_trait]
impl MappingStrategy for TrancheAwareSeriesStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let own = metadata.get(self.field);
        if !own.trim().is_empty() {
            return Ok(own.trim().to_string());
        }
        if self.field == MetadataField::SeriesNumber && context.lookup_str("series_name").is_none() && metadata.series_name.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(context.lookup_str(self.config_key).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use crate::mapping::basic::DirectMappingStrategy;
    use serde_json::json;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_manager_rules() {
        let config = json!({
            "field_overrides": {"Series Name": "X", "Keywords": "AI", "Publisher": 7},
            "append_fields": ["Keywords"],
            "blank_fields": ["Reserved 1"],
            "append_separator": "; "
        });
        let m = TrancheOverrideManager::from_config(config.as_object().unwrap());
        assert_eq!(m.apply("Series Name", "Base".into()), "X");
        assert_eq!(m.apply("series_name", "Base".into()), "X");
        assert_eq!(m.apply("Keywords", "tides".into()), "tides; AI");
        assert_eq!(m.apply("Keywords", "".into()), "AI");
        assert_eq!(m.apply("Publisher", "".into()), "7");
        assert_eq!(m.apply("Reserved 1", "x".into()), "");
        assert_eq!(m.apply("Title", "T".into()), "T");
    }

    #[tokio::test]
    async fn test_registry_respects_series_override() {
        let mut registry = FieldMappingRegistry::new();
        registry.register_strategy("Series Name", DirectMappingStrategy::new(MetadataField::SeriesName));
        registry.register_strategy("Title", DirectMappingStrategy::new(MetadataField::Title));
        let manager = TrancheOverrideManager::new()
            .with_override("Series Name", "X")
            .with_override("LSI FlexField1", "flex");
        wrap_registry_with_tranche_overrides(&mut registry, Arc::new(manager));

        let mut book = CodexMetadata::new("Tide Tables", "A");
        book.series_name = "Own Series".into();
        let row = registry
            .apply_mappings(&book, &headers(&["Title", "Series Name", "LSI FlexField1"]))
            .await;
        assert_eq!(row["Series Name"], "X");
        assert_eq!(row["Title"], "Tide Tables");
        assert_eq!(row["LSI FlexField1"], "flex");
    }

    struct Failing;

    #[async_trait]
    impl MappingStrategy for Failing {
        async fn map_field(&self, _: &CodexMetadata, _: &MappingContext<'_>) -> Result<String, MappingError> {
            Err(MappingError::Computation("boom".into()))
        }
    }

    #[tokio::test]
    async fn test_replacement_skips_failing_base() {
        let manager = Arc::new(TrancheOverrideManager::new().with_override("Broken", "fixed"));
        let wrapper = TrancheOverrideWrapper::new("Broken", Arc::new(Failing), manager);
        assert_eq!(run(&wrapper, &CodexMetadata::default(), &Map::new()).await.unwrap(), "fixed");

        let manager = Arc::new(TrancheOverrideManager::new().with_blank("Other"));
        let wrapper = TrancheOverrideWrapper::new("Broken", Arc::new(Failing), manager);
        assert!(run(&wrapper, &CodexMetadata::default(), &Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_override_strategy_prefers_config() {
        let cfg = json!({"lightning_source_account": "6024045"}).as_object().cloned().unwrap();
        let s = TrancheOverrideStrategy::new("Lightning Source Account").with_fallback("none");
        let mut m = CodexMetadata::default();
        assert_eq!(run(&s, &m, &cfg).await.unwrap(), "6024045");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "none");

        let s = TrancheOverrideStrategy::new("lsi_account");
        m.lsi_account = "1111".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "1111");
    }

    #[tokio::test]
    async fn test_series_strategy_falls_back_to_tranche() {
        let cfg = json!({"series_name": "Pilsa", "series_number": "3"}).as_object().cloned().unwrap();
        let mut m = CodexMetadata::default();
        assert_eq!(run(&TrancheAwareSeriesStrategy::name(), &m, &cfg).await.unwrap(), "Pilsa");
        assert_eq!(run(&TrancheAwareSeriesStrategy::number(), &m, &cfg).await.unwrap(), "3");
        assert_eq!(run(&TrancheAwareSeriesStrategy::number(), &m, &Map::new()).await.unwrap(), "");
        m.series_name = "Own".into();
        assert_eq!(run(&TrancheAwareSeriesStrategy::name(), &m, &cfg).await.unwrap(), "Own");
        assert!(TrancheAwareSeriesStrategy::for_field("title").is_err());
    }
}
