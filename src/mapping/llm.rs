//! LLM-backed field completion with metadata and cached-completion tiers.

use super::{MappingContext, MappingStrategy};
use crate::completion::{CompletionRequest, FieldCompleter};
use crate::error::MappingError;
use crate::metadata::{normalize_key, value_to_field_string, CodexMetadata, MetadataField};
use crate::validation::text::truncate_chars;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves a field from, in order: the metadata field itself, stored
/// `llm_completions`, a live completer call, then a fallback value.
///
/// Completer failures are logged and fall through to the fallback.
pub struct LLMCompletionStrategy {
    field_name: String,
    metadata_field: Option<MetadataField>,
    prompt_key: Option<String>,
    completer: Option<Arc<dyn FieldCompleter>>,
    fallback: String,
    max_length: Option<usize>,
}

impl LLMCompletionStrategy {
    /// `field_name` is the logical name used to search stored completions.
    pub fn new(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        let metadata_field = field_name.parse().ok();
        Self {
            field_name,
            metadata_field,
            prompt_key: None,
            completer: None,
            fallback: String::new(),
            max_length: None,
        }
    }

    pub fn with_prompt_key(mut self, prompt_key: impl Into<String>) -> Self {
        self.prompt_key = Some(prompt_key.into());
        self
    }

    pub fn with_completer(mut self, completer: Option<Arc<dyn FieldCompleter>>) -> Self {
        self.completer = completer;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Key spellings a stored completion might use for this field.
    fn name_variants(&self) -> Vec<String> {
        let mut variants = vec![normalize_key(&self.field_name)];
        if let Some(field) = self.metadata_field {
            variants.push(field.name().to_string());
        }
        if let Some(key) = &self.prompt_key {
            variants.push(normalize_key(key));
        }
        variants.push(variants[0].replace('_', ""));
        variants.dedup();
        variants
    }

    /// Search stored completions. A prompt entry may be the value itself or
    /// an object that holds the field under one of its name variants.
    fn from_stored_completions(&self, metadata: &CodexMetadata) -> Option<String> {
        let variants = self.name_variants();
        let matches = |key: &str| {
            let key = normalize_key(key);
            variants.iter().any(|v| *v == key || *v == key.replace('_', ""))
        };
        let in_object = |value: &Value| -> Option<String> {
            let obj = value.get("parsed_content").unwrap_or(value).as_object()?;
            obj.iter()
                .find(|(k, _)| matches(k))
                .and_then(|(_, v)| value_to_field_string(v))
                .filter(|s| !s.trim().is_empty())
        };

        if let Some(prompt_key) = &self.prompt_key {
            if let Some(stored) = metadata.llm_completions.get(prompt_key) {
                let found = match stored {
                    Value::Object(_) => in_object(stored),
                    other => value_to_field_string(other).filter(|s| !s.trim().is_empty()),
                };
                if found.is_some() {
                    return found;
                }
            }
        }

        for (prompt, stored) in &metadata.llm_completions {
            if let Some(found) = in_object(stored) {
                debug!("Found '{}' in stored completion '{}'", self.field_name, prompt);
                return Some(found);
            }
            if matches(prompt) {
                if let Some(found) = value_to_field_string(stored).filter(|s| !s.trim().is_empty()) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn finish(&self, value: String) -> String {
        match self.max_length {
            Some(max) => truncate_chars(value.trim(), max),
            None => value.trim().to_string(),
        }
    }
}

#[async_trait]
impl MappingStrategy for LLMCompletionStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        if let Some(field) = self.metadata_field {
            let direct = metadata.get(field);
            if !direct.trim().is_empty() {
                return Ok(self.finish(direct));
            }
        }

        if let Some(stored) = self.from_stored_completions(metadata) {
            return Ok(self.finish(stored));
        }

        if let Some(completer) = &self.completer {
            let request = CompletionRequest {
                field_name: context.field_name,
                prompt_key: self.prompt_key.as_deref().or(self.metadata_field.map(MetadataField::name)),
                metadata,
                max_length: self.max_length,
            };
            match completer.complete_field(&request).await {
                Ok(Some(value)) if !value.trim().is_empty() => return Ok(self.finish(value)),
                Ok(_) => debug!("Completer returned nothing for '{}'", self.field_name),
                Err(e) => warn!("Completion for '{}' failed: {:#}", self.field_name, e),
            }
        }

        Ok(self.fallback.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Completer returning a fixed value and counting calls.
    pub(crate) struct FixedCompleter {
        pub value: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FixedCompleter {
        pub(crate) fn new(value: Option<&str>) -> Self {
            Self {
                value: value.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FieldCompleter for FixedCompleter {
        async fn complete_field(&self, _request: &CompletionRequest<'_>) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl FieldCompleter for FailingCompleter {
        async fn complete_field(&self, _request: &CompletionRequest<'_>) -> anyhow::Result<Option<String>> {
            anyhow::bail!("network down")
        }
    }

    #[tokio::test]
    async fn test_metadata_field_wins_without_calling_completer() {
        let completer = Arc::new(FixedCompleter::new(Some("generated")));
        let s = LLMCompletionStrategy::new("contributor_one_bio").with_completer(Some(completer.clone()));
        let mut m = CodexMetadata::new("T", "A");
        m.contributor_one_bio = "Existing bio".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "Existing bio");
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_completion_discovered_under_other_prompt() {
        let completer = Arc::new(FixedCompleter::new(Some("generated")));
        let s = LLMCompletionStrategy::new("contributor_one_bio")
            .with_prompt_key("author_prompt")
            .with_completer(Some(completer.clone()));
        let mut m = CodexMetadata::new("T", "A");
        m.llm_completions.insert(
            "imprint_prompts".into(),
            json!({"parsed_content": {"Contributor One Bio": "Stored bio"}}),
        );
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "Stored bio");
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completer_then_fallback() {
        let s = LLMCompletionStrategy::new("Annotation")
            .with_completer(Some(Arc::new(FixedCompleter::new(Some("  generated  ")))))
            .with_fallback("fb");
        let m = CodexMetadata::new("T", "A");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "generated");

        let s = LLMCompletionStrategy::new("Annotation")
            .with_completer(Some(Arc::new(FailingCompleter)))
            .with_fallback("fb");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "fb");

        let s = LLMCompletionStrategy::new("Annotation").with_fallback("fb");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "fb");
    }

    #[tokio::test]
    async fn test_max_length_applies_to_every_tier() {
        let s = LLMCompletionStrategy::new("keywords").with_max_length(8);
        let mut m = CodexMetadata::new("T", "A");
        m.keywords = "one; two; three".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "one; ...");
    }
}
