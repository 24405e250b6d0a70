//! Interior, cover and jacket file names.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::{CodexMetadata, MetadataField};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

const MAX_FILENAME_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Interior,
    Cover,
    Jacket,
}

impl FileKind {
    fn key(self) -> &'static str {
        match self {
            FileKind::Interior => "interior",
            FileKind::Cover => "cover",
            FileKind::Jacket => "jacket",
        }
    }

    fn metadata_field(self) -> MetadataField {
        match self {
            FileKind::Interior => MetadataField::InteriorPath,
            FileKind::Cover => MetadataField::CoverPath,
            FileKind::Jacket => MetadataField::JacketPath,
        }
    }

    fn default_template(self) -> &'static str {
        match self {
            FileKind::Interior => "{isbn}_interior.pdf",
            FileKind::Cover => "{isbn}_cover.pdf",
            FileKind::Jacket => "{isbn}_jacket.pdf",
        }
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with underscores and cap the
/// length.
pub fn sanitize_filename(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"));
    let cleaned = re.replace_all(raw.trim(), "_");
    cleaned.trim_matches('_').chars().take(MAX_FILENAME_CHARS).collect()
}

/// Builds upload file names from a template.
///
/// Templates come from the strategy, then the `file_path_templates`
/// configuration object keyed by `interior`, `cover` or `jacket`. An explicit
/// path on the metadata is used verbatim. Jacket names are only produced for
/// jacketed renditions.
pub struct FilePathStrategy {
    kind: FileKind,
    template: Option<String>,
}

impl FilePathStrategy {
    pub fn new(kind: FileKind) -> Self {
        Self { kind, template: None }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    fn template(&self, context: &MappingContext<'_>) -> String {
        if let Some(t) = &self.template {
            return t.clone();
        }
        context
            .lookup("file_path_templates")
            .and_then(|templates| templates.get(self.kind.key()).and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| self.kind.default_template().to_string())
    }
}

fn render_template(template: &str, metadata: &CodexMetadata) -> String {
    let isbn: String = metadata.isbn13.chars().filter(char::is_ascii_digit).collect();
    let isbn = if isbn.is_empty() { metadata.shortuuid.clone() } else { isbn };
    let rendered = template
        .replace("{isbn}", &isbn)
        .replace("{title}", &sanitize_filename(&metadata.title))
        .replace("{imprint}", &sanitize_filename(&metadata.imprint))
        .replace("{publisher}", &sanitize_filename(&metadata.publisher))
        .replace("{shortuuid}", &metadata.shortuuid);
    sanitize_filename(&rendered)
}

#[async_trait]
impl MappingStrategy for FilePathStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let explicit = metadata.get(self.kind.metadata_field());
        if !explicit.trim().is_empty() {
            return Ok(explicit.trim().to_string());
        }

        if self.kind == FileKind::Jacket {
            let rendition = context
                .row_value("Rendition /Booktype")
                .map(str::to_string)
                .unwrap_or_else(|| metadata.rendition_booktype.clone());
            if !rendition.to_lowercase().contains("jacket") {
                return Ok(String::new());
            }
        }

        if metadata.isbn13.trim().is_empty() && metadata.shortuuid.is_empty() {
            return Err(MappingError::MissingInput("ISBN or short uuid for file name".into()));
        }
        Ok(render_template(&self.template(context), metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::{json, Map};

    fn book() -> CodexMetadata {
        let mut m = CodexMetadata::new("The Sea: A History", "A");
        m.isbn13 = "978-0-306-40615-7".into();
        m.imprint = "Xynapse Traces".into();
        m
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("The Sea: A History?"), "The_Sea_A_History");
        assert_eq!(sanitize_filename(&"a".repeat(150)).len(), 100);
    }

    #[tokio::test]
    async fn test_default_and_configured_templates() {
        let s = FilePathStrategy::new(FileKind::Interior);
        assert_eq!(run(&s, &book(), &Map::new()).await.unwrap(), "9780306406157_interior.pdf");

        let cfg = json!({"file_path_templates": {"cover": "{imprint}/{isbn}_{title}.pdf"}})
            .as_object()
            .cloned()
            .unwrap();
        let s = FilePathStrategy::new(FileKind::Cover);
        assert_eq!(
            run(&s, &book(), &cfg).await.unwrap(),
            "Xynapse_Traces_9780306406157_The_Sea_A_History.pdf"
        );
    }

    #[tokio::test]
    async fn test_shortuuid_when_no_isbn_and_explicit_path() {
        let mut m = book();
        m.isbn13.clear();
        let s = FilePathStrategy::new(FileKind::Interior).with_template("{shortuuid}.pdf");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), format!("{}.pdf", m.shortuuid));

        m.interior_path = "custom/interior.pdf".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "custom/interior.pdf");
    }

    #[tokio::test]
    async fn test_jacket_only_for_jacketed_rendition() {
        let s = FilePathStrategy::new(FileKind::Jacket);
        let mut m = book();
        m.rendition_booktype = "Perfect Bound".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "");
        m.rendition_booktype = "Cloth w/ Jacket".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "9780306406157_jacket.pdf");
    }
}
