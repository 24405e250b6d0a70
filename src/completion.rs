//! LLM field completion.
//!
//! Strategies that need generated text depend on the [`FieldCompleter`] trait;
//! [`LlmFieldCompleter`] implements it over OpenRouter.

use crate::metadata::{value_to_field_string, CodexMetadata};
use crate::openrouter::{Message, OpenRouterClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// One field-completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Column or logical field being completed.
    pub field_name: &'a str,
    /// Prompt to use; derived from `field_name` when absent.
    pub prompt_key: Option<&'a str>,
    pub metadata: &'a CodexMetadata,
    pub max_length: Option<usize>,
}

impl CompletionRequest<'_> {
    pub fn prompt_key(&self) -> String {
        self.prompt_key
            .map(str::to_string)
            .unwrap_or_else(|| crate::metadata::normalize_key(self.field_name))
    }
}

/// Source of generated field values.
#[async_trait]
pub trait FieldCompleter: Send + Sync {
    /// Returns `Ok(None)` when the completer has nothing for the field.
    async fn complete_field(&self, request: &CompletionRequest<'_>) -> Result<Option<String>>;
}

const SYSTEM_PROMPT: &str = "You are a book metadata specialist preparing Lightning Source (LSI) \
distribution data. Respond only with a JSON object of the form {\"value\": \"...\"}. \
Use an empty string when the book details do not support an answer.";

/// Instructions for the prompts the LSI registry uses.
const FIELD_INSTRUCTIONS: &[(&str, &str)] = &[
    ("annotation", "Write a marketing annotation of two or three paragraphs for retailer listings."),
    ("short_description", "Write a one or two sentence description under 350 bytes."),
    ("keywords", "List 7 to 12 search keywords separated by semicolons."),
    ("bisac_codes", "Give up to three BISAC subject codes with headings, separated by semicolons, most specific first."),
    ("thema_subjects", "Give up to three Thema subject codes separated by semicolons."),
    ("contributor_one_bio", "Write a third-person biography of the primary contributor in under 100 words."),
    ("contributor_one_affiliations", "Name the primary contributor's institutional affiliations, if known."),
    ("contributor_one_professional_position", "Give the primary contributor's professional position, if known."),
    ("contributor_one_location", "Give the primary contributor's city and country, if known."),
    ("table_of_contents", "Produce a plausible table of contents, one chapter per line."),
    ("review_quotes", "Summarize notable reception in one sentence without fabricating quotes."),
    ("audience", "Name the intended audience: General/Trade, Professional, Scholarly, Juvenile or Young Adult."),
    ("min_age", "Give the minimum reader age as a number, or an empty string for adult titles."),
    ("max_age", "Give the maximum reader age as a number, or an empty string for adult titles."),
    ("illustration_notes", "Describe the illustrations in a few words, if any."),
    ("series_name", "Give the series name if the book belongs to one."),
];

/// Entries kept before the completion cache starts over.
const MAX_CACHE_ENTRIES: usize = 2048;

/// Completions keyed by a SHA-256 of the prompt, so identical book details
/// share an entry whatever the book's uuid. Cleared when full.
#[derive(Default)]
struct CompletionCache {
    entries: RwLock<HashMap<String, Option<String>>>,
}

impl CompletionCache {
    fn key(prompt: &str) -> String {
        format!("{:x}", Sha256::digest(prompt.as_bytes()))
    }

    fn get(&self, key: &str) -> Option<Option<String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn insert(&self, key: String, value: Option<String>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_CACHE_ENTRIES && !entries.contains_key(&key) {
            debug!("Completion cache full at {} entries, clearing", entries.len());
            entries.clear();
        }
        entries.insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// [`FieldCompleter`] over OpenRouter chat completions. Results, including
/// empty ones, are cached per prompt.
pub struct LlmFieldCompleter {
    client: OpenRouterClient,
    cache: CompletionCache,
}

impl LlmFieldCompleter {
    pub fn new(client: OpenRouterClient) -> Self {
        Self {
            client,
            cache: CompletionCache::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenRouterClient::from_env()?))
    }
}

#[async_trait]
impl FieldCompleter for LlmFieldCompleter {
    async fn complete_field(&self, request: &CompletionRequest<'_>) -> Result<Option<String>> {
        let prompt_key = request.prompt_key();
        let prompt = build_prompt(request);
        let key = CompletionCache::key(&prompt);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Completion cache hit for '{}' ({})", request.metadata.title, prompt_key);
            return Ok(hit);
        }

        info!("Requesting LLM completion for '{}' ({})", request.field_name, prompt_key);
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let response: Value = self
            .client
            .chat_json(messages)
            .await
            .with_context(|| format!("LLM completion failed for {}", request.field_name))?;

        let value = extract_completion(&response, &prompt_key).map(|v| match request.max_length {
            Some(max) => crate::validation::text::truncate_chars(&v, max),
            None => v,
        });

        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

fn build_prompt(request: &CompletionRequest<'_>) -> String {
    let key = request.prompt_key();
    let instruction = FIELD_INSTRUCTIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| format!("Provide the value for the LSI field '{}'.", request.field_name));

    let m = request.metadata;
    let mut details = Vec::new();
    for (label, value) in [
        ("Title", m.title.as_str()),
        ("Subtitle", m.subtitle.as_str()),
        ("Author", m.author.as_str()),
        ("Publisher", m.publisher.as_str()),
        ("Imprint", m.imprint.as_str()),
        ("Keywords", m.keywords.as_str()),
        ("BISAC", m.bisac_codes.as_str()),
    ] {
        if !value.trim().is_empty() {
            details.push(format!("{}: {}", label, value.trim()));
        }
    }
    let summary = if m.summary_long.trim().is_empty() { &m.summary_short } else { &m.summary_long };
    if !summary.trim().is_empty() {
        details.push(format!("Summary: {}", truncate_for_context(summary.trim(), 3000)));
    }
    if let Some(max) = request.max_length {
        details.push(format!("Maximum length: {} characters", max));
    }

    format!("{}\n\nBook details:\n{}", instruction, details.join("\n"))
}

fn truncate_for_context(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Pull the completed value out of a parsed response. Accepts
/// `{"value": ..}`, `{"<prompt_key>": ..}` and either wrapped in
/// `parsed_content`.
pub fn extract_completion(response: &Value, prompt_key: &str) -> Option<String> {
    let body = response.get("parsed_content").unwrap_or(response);
    let value = match body {
        Value::Object(map) => map.get("value").or_else(|| map.get(prompt_key))?,
        other => other,
    };
    value_to_field_string(value).filter(|s| !s.trim().is_empty())
}

/// Parse JSON from an LLM response, tolerating markdown code fences.
pub fn parse_llm_json<T: serde::de::DeserializeOwned>(response: &str) -> Result<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    };

    serde_json::from_str(json_str).with_context(|| {
        format!(
            "Invalid JSON in LLM response: {}",
            json_str.chars().take(200).collect::<String>()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_llm_json_strips_fences() {
        let v: Value = parse_llm_json("Here:\n```json\n{\"value\": \"x\"}\n```").unwrap();
        assert_eq!(v["value"], "x");
        let v: Value = parse_llm_json("  {\"a\": 1} ").unwrap();
        assert_eq!(v["a"], 1);
        assert!(parse_llm_json::<Value>("not json").is_err());
    }

    #[test]
    fn test_extract_completion_shapes() {
        assert_eq!(extract_completion(&json!({"value": "A"}), "k").as_deref(), Some("A"));
        assert_eq!(
            extract_completion(&json!({"parsed_content": {"keywords": ["a", "b"]}}), "keywords").as_deref(),
            Some("a; b")
        );
        assert_eq!(extract_completion(&json!({"value": ""}), "k"), None);
        assert_eq!(extract_completion(&json!("plain"), "k").as_deref(), Some("plain"));
    }

    #[test]
    fn test_prompt_includes_book_details() {
        let mut m = CodexMetadata::new("Tide Tables", "R. Moss");
        m.summary_long = "A history of tides.".into();
        let request = CompletionRequest {
            field_name: "Annotation / Summary",
            prompt_key: Some("annotation"),
            metadata: &m,
            max_length: Some(4000),
        };
        let prompt = build_prompt(&request);
        assert!(prompt.starts_with("Write a marketing annotation"));
        assert!(prompt.contains("Title: Tide Tables"));
        assert!(prompt.contains("Summary: A history of tides."));
        assert!(prompt.contains("Maximum length: 4000"));
    }

    #[test]
    fn test_cache_key_ignores_uuid_and_tracks_content() {
        let a = CodexMetadata::new("Tide Tables", "R. Moss");
        let b = CodexMetadata::new("Tide Tables", "R. Moss");
        assert_ne!(a.uuid, b.uuid);
        fn key_for(m: &CodexMetadata) -> String {
            let request = CompletionRequest {
                field_name: "Keywords",
                prompt_key: None,
                metadata: m,
                max_length: None,
            };
            CompletionCache::key(&build_prompt(&request))
        }
        assert_eq!(key_for(&a), key_for(&b));

        let mut c = b.clone();
        c.summary_long = "Different book details.".into();
        assert_ne!(key_for(&a), key_for(&c));
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = CompletionCache::default();
        for i in 0..MAX_CACHE_ENTRIES {
            cache.insert(CompletionCache::key(&i.to_string()), None);
        }
        assert_eq!(cache.len(), MAX_CACHE_ENTRIES);
        cache.insert(CompletionCache::key("0"), Some("again".into()));
        assert_eq!(cache.len(), MAX_CACHE_ENTRIES);
        assert_eq!(cache.get(&CompletionCache::key("0")), Some(Some("again".into())));

        cache.insert(CompletionCache::key("one more"), Some("x".into()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&CompletionCache::key("0")), None);
    }

    #[test]
    fn test_prompt_key_defaults_to_normalized_field() {
        let m = CodexMetadata::default();
        let request = CompletionRequest {
            field_name: "Contributor One BIO",
            prompt_key: None,
            metadata: &m,
            max_length: None,
        };
        assert_eq!(request.prompt_key(), "contributor_one_bio");
    }
}
