//! Annotation, short description, keywords and rendition columns.

use super::llm::LLMCompletionStrategy;
use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::CodexMetadata;
use crate::validation::text::{
    collapse_whitespace, escape_html, strip_html, strip_markdown, truncate_chars,
    validate_and_truncate_short_description, ANNOTATION_MAX_CHARS, SHORT_DESCRIPTION_MAX_BYTES,
};
use crate::validation::SubjectServices;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Split text into cleaned paragraphs on blank lines.
fn paragraphs(text: &str) -> Vec<String> {
    strip_markdown(text)
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(|p| collapse_whitespace(&strip_html(p)))
        .filter(|p| !p.is_empty())
        .collect()
}

fn wrap(paragraphs: &[String]) -> String {
    paragraphs.iter().map(|p| format!("<p>{}</p>", escape_html(p))).collect()
}

/// One `<p>` paragraph of `text`, cut so the escaped markup stays within
/// `limit` chars. Empty when no text fits.
fn fit_paragraph(text: &str, limit: usize) -> String {
    let mut budget = limit.saturating_sub("<p></p>".len());
    loop {
        let cut = truncate_chars(text, budget);
        if cut.is_empty() {
            return String::new();
        }
        let rendered = wrap(std::slice::from_ref(&cut));
        let len = rendered.chars().count();
        if len <= limit {
            return rendered;
        }
        budget = budget.saturating_sub(len - limit);
    }
}

/// Retailer annotation as `<p>` paragraphs.
///
/// The body is the book's annotation, long summary or short summary, or a
/// completion when none is set. Tranche `annotation_boilerplate` (a string
/// suffix, or an object with `prefix` and `suffix`) is added around it. The
/// body is shortened so the whole column stays within the LSI limit.
pub struct AnnotationStrategy {
    completion: Option<LLMCompletionStrategy>,
    max_chars: usize,
}

impl AnnotationStrategy {
    pub fn new(completion: Option<LLMCompletionStrategy>) -> Self {
        Self {
            completion,
            max_chars: ANNOTATION_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn boilerplate(context: &MappingContext<'_>) -> (Option<String>, Option<String>) {
        match context.lookup("annotation_boilerplate") {
            Some(Value::String(suffix)) => (None, Some(suffix)),
            Some(Value::Object(obj)) => {
                let get = |k: &str| {
                    obj.get(k)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .filter(|s| !s.trim().is_empty())
                };
                (get("prefix"), get("suffix"))
            }
            _ => (None, None),
        }
    }
}

#[async_trait]
impl MappingStrategy for AnnotationStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let mut body = [&metadata.annotation, &metadata.summary_long, &metadata.summary_short]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_default();
        if body.trim().is_empty() {
            if let Some(completion) = &self.completion {
                body = completion.map_field(metadata, context).await?;
            }
        }
        if body.trim().is_empty() {
            return Err(MappingError::MissingInput("annotation or summary".into()));
        }

        let (prefix, suffix) = Self::boilerplate(context);
        let frame: Vec<String> = prefix.iter().chain(suffix.iter()).cloned().collect();
        let overhead = wrap(&frame).chars().count();

        let body_paragraphs = paragraphs(&body);
        let mut rendered = wrap(&body_paragraphs);
        if overhead + rendered.chars().count() > self.max_chars {
            let flat = body_paragraphs.join(" ");
            rendered = fit_paragraph(&flat, self.max_chars.saturating_sub(overhead));
            if rendered.is_empty() {
                // boilerplate leaves no room for the body
                return Ok(fit_paragraph(&flat, self.max_chars));
            }
        }

        let mut out = String::new();
        if let Some(prefix) = &prefix {
            out.push_str(&wrap(std::slice::from_ref(prefix)));
        }
        out.push_str(&rendered);
        if let Some(suffix) = &suffix {
            out.push_str(&wrap(std::slice::from_ref(suffix)));
        }
        Ok(out)
    }
}

/// Short description within the LSI byte limit.
pub struct ShortDescriptionStrategy {
    max_bytes: usize,
}

impl Default for ShortDescriptionStrategy {
    fn default() -> Self {
        Self {
            max_bytes: SHORT_DESCRIPTION_MAX_BYTES,
        }
    }
}

impl ShortDescriptionStrategy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl MappingStrategy for ShortDescriptionStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, _context: &MappingContext<'_>) -> Result<String, MappingError> {
        let source = [&metadata.summary_short, &metadata.summary_long, &metadata.annotation]
            .into_iter()
            .find(|s| !s.trim().is_empty());
        let Some(source) = source else {
            return Ok(String::new());
        };
        let clean = collapse_whitespace(&strip_html(&strip_markdown(source)));
        Ok(validate_and_truncate_short_description(&clean, self.max_bytes))
    }
}

/// Keyword list normalized to `"; "` separators without duplicates.
pub struct KeywordsStrategy;

#[async_trait]
impl MappingStrategy for KeywordsStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, _context: &MappingContext<'_>) -> Result<String, MappingError> {
        let mut keywords: Vec<String> = Vec::new();
        for word in metadata.keywords.split([';', ',', '\n']).map(str::trim) {
            if !word.is_empty() && !keywords.iter().any(|k| k.eq_ignore_ascii_case(word)) {
                keywords.push(word.to_string());
            }
        }
        Ok(keywords.join("; "))
    }
}

/// Valid LSI rendition / booktype for the book.
pub struct RenditionBooktypeStrategy {
    services: Arc<SubjectServices>,
    default: String,
}

impl RenditionBooktypeStrategy {
    pub fn new(services: Arc<SubjectServices>) -> Self {
        Self {
            services,
            default: "Perfect Bound".to_string(),
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }
}

#[async_trait]
impl MappingStrategy for RenditionBooktypeStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let renditions = &self.services.renditions;
        let explicit = metadata.rendition_booktype.trim();
        if !explicit.is_empty() {
            return renditions
                .canonical(explicit)
                .or_else(|| renditions.for_binding(explicit))
                .map(str::to_string)
                .ok_or_else(|| MappingError::invalid(context.field_name, format!("'{}' is not a valid booktype", explicit)));
        }
        if let Some(booktype) = renditions.for_binding(&metadata.binding) {
            return Ok(booktype.to_string());
        }
        if let Some(configured) = context.lookup_str("rendition_booktype") {
            if let Some(booktype) = renditions.canonical(&configured) {
                return Ok(booktype.to_string());
            }
        }
        Ok(renditions.canonical(&self.default).unwrap_or(&self.default).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use crate::mapping::llm::tests::FixedCompleter;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_annotation_paragraphs_and_boilerplate() {
        let mut m = CodexMetadata::new("T", "A");
        m.summary_long = "**First** paragraph.\n\nSecond & last.".into();
        let cfg = json!({"annotation_boilerplate": {"prefix": "New from Nimble.", "suffix": "Part of the series."}})
            .as_object()
            .cloned()
            .unwrap();
        let out = run(&AnnotationStrategy::new(None), &m, &cfg).await.unwrap();
        assert_eq!(
            out,
            "<p>New from Nimble.</p><p>First paragraph.</p><p>Second &amp; last.</p><p>Part of the series.</p>"
        );
    }

    #[tokio::test]
    async fn test_annotation_stays_within_limit() {
        let mut m = CodexMetadata::new("T", "A");
        m.annotation = "word ".repeat(2000);
        let cfg = json!({"annotation_boilerplate": "Suffix."}).as_object().cloned().unwrap();
        let s = AnnotationStrategy::new(None).with_max_chars(500);
        let out = run(&s, &m, &cfg).await.unwrap();
        assert!(out.chars().count() <= 500, "{}", out.chars().count());
        assert!(out.ends_with("<p>Suffix.</p>"));
    }

    #[tokio::test]
    async fn test_escaped_annotation_is_cut_between_entities() {
        let mut m = CodexMetadata::new("T", "A");
        m.annotation = "R&D notes ".repeat(100);
        let cfg = json!({"annotation_boilerplate": "Suffix."}).as_object().cloned().unwrap();
        let s = AnnotationStrategy::new(None).with_max_chars(120);
        let out = run(&s, &m, &cfg).await.unwrap();
        assert!(out.chars().count() <= 120, "{}", out.chars().count());
        assert!(out.starts_with("<p>R&amp;D"));
        assert!(out.ends_with("...</p><p>Suffix.</p>"), "{}", out);
        assert_eq!(out.matches('&').count(), out.matches("&amp;").count());

        let tight = AnnotationStrategy::new(None).with_max_chars(20);
        let out = run(&tight, &m, &cfg).await.unwrap();
        assert!(out.chars().count() <= 20, "{}", out);
        assert!(out.starts_with("<p>") && out.ends_with("</p>"), "{}", out);
    }

    #[tokio::test]
    async fn test_annotation_uses_completion_then_fails() {
        let m = CodexMetadata::new("T", "A");
        let completion = LLMCompletionStrategy::new("annotation")
            .with_completer(Some(Arc::new(FixedCompleter::new(Some("Generated text.")))));
        let out = run(&AnnotationStrategy::new(Some(completion)), &m, &Map::new()).await.unwrap();
        assert_eq!(out, "<p>Generated text.</p>");

        assert!(matches!(
            run(&AnnotationStrategy::new(None), &m, &Map::new()).await,
            Err(MappingError::MissingInput(_))
        ));
    }

    #[tokio::test]
    async fn test_short_description_falls_back_to_long_summary() {
        let mut m = CodexMetadata::new("T", "A");
        m.summary_long = format!("<p>{}</p>", "Long text here. ".repeat(50));
        let out = run(&ShortDescriptionStrategy::default(), &m, &Map::new()).await.unwrap();
        assert!(out.len() <= SHORT_DESCRIPTION_MAX_BYTES);
        assert!(out.starts_with("Long text here."));
        assert!(out.ends_with("..."));
    }

    #[tokio::test]
    async fn test_keywords_deduplicated() {
        let mut m = CodexMetadata::new("T", "A");
        m.keywords = "tides, Oceans; tides\nnavigation".into();
        assert_eq!(run(&KeywordsStrategy, &m, &Map::new()).await.unwrap(), "tides; Oceans; navigation");
    }

    #[tokio::test]
    async fn test_rendition_sources() {
        let s = RenditionBooktypeStrategy::new(Arc::new(SubjectServices::default()));
        let mut m = CodexMetadata::new("T", "A");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "Perfect Bound");
        m.binding = "hardcover".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "Case Laminate");
        m.rendition_booktype = "cloth w/ jacket".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "Cloth w/ Jacket");
        m.rendition_booktype = "Scroll".into();
        assert!(run(&s, &m, &Map::new()).await.is_err());
    }
}
