//! Direct, constant, computed and conditional strategies.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::{CodexMetadata, MetadataField};
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;

/// Copies a metadata field, trying fallbacks in order.
#[derive(Debug, Clone)]
pub struct DirectMappingStrategy {
    fields: Vec<MetadataField>,
    config_key: Option<String>,
    default: String,
}

impl DirectMappingStrategy {
    pub fn new(field: MetadataField) -> Self {
        Self {
            fields: vec![field],
            config_key: None,
            default: String::new(),
        }
    }

    /// Build from a field name, failing on names that are not metadata fields.
    pub fn named(field_name: &str) -> Result<Self, MappingError> {
        Ok(Self::new(field_name.parse()?))
    }

    /// Try `field` when every earlier field is empty.
    pub fn or_field(mut self, field: MetadataField) -> Self {
        self.fields.push(field);
        self
    }

    /// Consult configuration under `key` when every field is empty.
    pub fn or_config(mut self, key: impl Into<String>) -> Self {
        self.config_key = Some(key.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }
}

#[async_trait]
impl MappingStrategy for DirectMappingStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        if let Some(value) = metadata.first_non_empty(&self.fields) {
            return Ok(value);
        }
        if let Some(value) = self.config_key.as_deref().and_then(|k| context.lookup_str(k)) {
            return Ok(value);
        }
        Ok(self.default.clone())
    }
}

/// Always returns the same value.
#[derive(Debug, Clone)]
pub struct DefaultMappingStrategy {
    value: String,
}

impl DefaultMappingStrategy {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }

    /// Strategy for reserved or intentionally blank columns.
    pub fn blank() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl MappingStrategy for DefaultMappingStrategy {
    async fn map_field(&self, _metadata: &CodexMetadata, _context: &MappingContext<'_>) -> Result<String, MappingError> {
        Ok(self.value.clone())
    }
}

type ComputeFn = dyn Fn(&CodexMetadata, &MappingContext<'_>) -> Result<String, MappingError> + Send + Sync;

/// Runs a function over the metadata and context. Errors from the function
/// are reported as computation failures.
#[derive(Clone)]
pub struct ComputedMappingStrategy {
    compute: Arc<ComputeFn>,
}

impl ComputedMappingStrategy {
    pub fn new<F, E>(compute: F) -> Self
    where
        F: Fn(&CodexMetadata, &MappingContext<'_>) -> Result<String, E> + Send + Sync + 'static,
        E: Display,
    {
        Self {
            compute: Arc::new(move |metadata: &CodexMetadata, context: &MappingContext<'_>| {
                compute(metadata, context).map_err(|e| MappingError::Computation(e.to_string()))
            }),
        }
    }

    /// Infallible variant over the metadata only.
    pub fn from_metadata<F>(compute: F) -> Self
    where
        F: Fn(&CodexMetadata) -> String + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(move |metadata: &CodexMetadata, _: &MappingContext<'_>| Ok(compute(metadata))),
        }
    }
}

#[async_trait]
impl MappingStrategy for ComputedMappingStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        (self.compute)(metadata, context)
    }
}

type Predicate = dyn Fn(&CodexMetadata, &MappingContext<'_>) -> bool + Send + Sync;

/// Picks one of two strategies by predicate.
#[derive(Clone)]
pub struct ConditionalMappingStrategy {
    predicate: Arc<Predicate>,
    when_true: Arc<dyn MappingStrategy>,
    when_false: Arc<dyn MappingStrategy>,
}

impl ConditionalMappingStrategy {
    pub fn new<P>(predicate: P, when_true: Arc<dyn MappingStrategy>, when_false: Arc<dyn MappingStrategy>) -> Self
    where
        P: Fn(&CodexMetadata, &MappingContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            when_true,
            when_false,
        }
    }

    fn branch(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> &Arc<dyn MappingStrategy> {
        if (self.predicate)(metadata, context) {
            &self.when_true
        } else {
            &self.when_false
        }
    }
}

#[async_trait]
impl MappingStrategy for ConditionalMappingStrategy {
    fn validate_input(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> bool {
        self.branch(metadata, context).validate_input(metadata, context)
    }

    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        self.branch(metadata, context).map_field(metadata, context).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::{json, Map, Value};

    /// Run a strategy against `metadata` with an ad-hoc config and no
    /// multi-level configuration.
    pub(crate) async fn run(
        strategy: &dyn MappingStrategy,
        metadata: &CodexMetadata,
        config: &Map<String, Value>,
    ) -> Result<String, MappingError> {
        let row = IndexMap::new();
        let ctx = MappingContext {
            field_name: "test",
            lsi_headers: &[],
            current_row_data: &row,
            config,
            configuration: None,
        };
        strategy.map_field(metadata, &ctx).await
    }

    #[tokio::test]
    async fn test_direct_with_fallbacks() {
        let mut m = CodexMetadata::new("Title", "Author");
        let config = Map::new();
        let s = DirectMappingStrategy::new(MetadataField::Subtitle)
            .or_field(MetadataField::Title)
            .with_default("none");
        assert_eq!(run(&s, &m, &config).await.unwrap(), "Title");

        m.title.clear();
        assert_eq!(run(&s, &m, &config).await.unwrap(), "none");

        let config = json!({"subtitle": "From config"}).as_object().cloned().unwrap();
        let s = DirectMappingStrategy::new(MetadataField::Subtitle).or_config("subtitle");
        assert_eq!(run(&s, &m, &config).await.unwrap(), "From config");
    }

    #[test]
    fn test_named_rejects_unknown_field() {
        assert!(DirectMappingStrategy::named("series_name").is_ok());
        assert!(matches!(
            DirectMappingStrategy::named("no_such_field"),
            Err(MappingError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_computed_error_is_reported() {
        let s = ComputedMappingStrategy::new(|m: &CodexMetadata, _: &MappingContext<'_>| {
            if m.page_count == 0 {
                Err("no pages")
            } else {
                Ok(m.page_count.to_string())
            }
        });
        let config = Map::new();
        let err = run(&s, &CodexMetadata::default(), &config).await.unwrap_err();
        assert_eq!(err, MappingError::Computation("no pages".into()));
    }

    #[tokio::test]
    async fn test_conditional_branches() {
        let s = ConditionalMappingStrategy::new(
            |m: &CodexMetadata, _: &MappingContext<'_>| m.binding.to_lowercase().contains("hard"),
            Arc::new(DefaultMappingStrategy::new("Case Laminate")),
            Arc::new(DefaultMappingStrategy::new("Perfect Bound")),
        );
        let config = Map::new();
        let mut m = CodexMetadata::default();
        assert_eq!(run(&s, &m, &config).await.unwrap(), "Perfect Bound");
        m.binding = "Hardcover".into();
        assert_eq!(run(&s, &m, &config).await.unwrap(), "Case Laminate");
    }
}
