//! BISAC category and Thema subject columns.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::{CodexMetadata, MetadataField};
use crate::validation::bisac::{split_bisac_list, BisacCheck};
use crate::validation::thema::split_thema_list;
use crate::validation::SubjectServices;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const BISAC_FIELDS: [MetadataField; 3] = [
    MetadataField::BisacCategory1,
    MetadataField::BisacCategory2,
    MetadataField::BisacCategory3,
];

const THEMA_FIELDS: [MetadataField; 3] = [
    MetadataField::ThemaSubject1,
    MetadataField::ThemaSubject2,
    MetadataField::ThemaSubject3,
];

/// Nth BISAC heading for the book, code prefix stripped.
///
/// Candidates are the tranche's `required_bisac_subject` (always first), the
/// explicit category fields, then the `bisac_codes` list. Unknown entries are
/// replaced by their nearest suggestion or dropped, and duplicates collapse,
/// so later categories shift up.
pub struct BisacCategoryStrategy {
    index: usize,
    services: Arc<SubjectServices>,
}

impl BisacCategoryStrategy {
    /// `index` is zero-based: 0 is "BISAC Category".
    pub fn new(index: usize, services: Arc<SubjectServices>) -> Self {
        Self { index, services }
    }

    fn candidates(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(required) = context.lookup_str("required_bisac_subject") {
            out.push(required);
        }
        for field in BISAC_FIELDS {
            out.extend(split_bisac_list(&metadata.get(field)));
        }
        out.extend(split_bisac_list(&metadata.bisac_codes));
        out
    }
}

#[async_trait]
impl MappingStrategy for BisacCategoryStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let mut seen: Vec<String> = Vec::new();
        let mut rejected: Vec<String> = Vec::new();

        for candidate in self.candidates(metadata, context) {
            match self.services.bisac.check(&candidate) {
                BisacCheck::Invalid { input } => rejected.push(input),
                check => {
                    if let BisacCheck::Suggested { input, heading, .. } = &check {
                        debug!("BISAC '{}' replaced by '{}'", input, heading);
                    }
                    if let Some(heading) = check.heading() {
                        if !seen.iter().any(|h| h == heading) {
                            seen.push(heading.to_string());
                        }
                    }
                }
            }
        }

        match seen.into_iter().nth(self.index) {
            Some(heading) => Ok(heading),
            None if self.index == 0 && !rejected.is_empty() => Err(MappingError::invalid(
                context.field_name,
                format!("no valid BISAC subject among {}", rejected.join("; ")),
            )),
            None => Ok(String::new()),
        }
    }
}

/// Nth Thema subject code for the book.
pub struct ThemaSubjectStrategy {
    index: usize,
    services: Arc<SubjectServices>,
}

impl ThemaSubjectStrategy {
    pub fn new(index: usize, services: Arc<SubjectServices>) -> Self {
        Self { index, services }
    }
}

#[async_trait]
impl MappingStrategy for ThemaSubjectStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, _context: &MappingContext<'_>) -> Result<String, MappingError> {
        let mut codes: Vec<String> = Vec::new();
        for field in THEMA_FIELDS {
            for entry in split_thema_list(&metadata.get(field)) {
                if let Some(code) = self.services.thema.check(&entry).code() {
                    if !codes.iter().any(|c| c == code) {
                        codes.push(code.to_string());
                    }
                }
            }
        }
        Ok(codes.into_iter().nth(self.index).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::{json, Map};

    fn services() -> Arc<SubjectServices> {
        Arc::new(SubjectServices::default())
    }

    #[tokio::test]
    async fn test_headings_are_stripped_and_ordered() {
        let mut m = CodexMetadata::new("T", "A");
        m.bisac_codes = "FIC028000 FICTION / Science Fiction / General; HIS027000".into();
        let first = BisacCategoryStrategy::new(0, services());
        let second = BisacCategoryStrategy::new(1, services());
        let third = BisacCategoryStrategy::new(2, services());
        assert_eq!(run(&first, &m, &Map::new()).await.unwrap(), "FICTION / Science Fiction / General");
        assert_eq!(run(&second, &m, &Map::new()).await.unwrap(), "HISTORY / Military / General");
        assert_eq!(run(&third, &m, &Map::new()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_required_subject_takes_first_slot() {
        let mut m = CodexMetadata::new("T", "A");
        m.bisac_category_1 = "HISTORY / General".into();
        let cfg = json!({"required_bisac_subject": "PHI000000"}).as_object().cloned().unwrap();
        let first = BisacCategoryStrategy::new(0, services());
        let second = BisacCategoryStrategy::new(1, services());
        assert_eq!(run(&first, &m, &cfg).await.unwrap(), "PHILOSOPHY / General");
        assert_eq!(run(&second, &m, &cfg).await.unwrap(), "HISTORY / General");
    }

    #[tokio::test]
    async fn test_invalid_only_subjects_fail_first_category() {
        let mut m = CodexMetadata::new("T", "A");
        m.bisac_codes = "UNDERWATER BASKETWEAVING".into();
        let first = BisacCategoryStrategy::new(0, services());
        assert!(matches!(
            run(&first, &m, &Map::new()).await,
            Err(MappingError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_thema_codes_collected_across_fields() {
        let mut m = CodexMetadata::new("T", "A");
        m.thema_subject_1 = "FM; FFHX".into();
        m.thema_subject_2 = "FM".into();
        m.thema_subject_3 = "??".into();
        let s = |i| ThemaSubjectStrategy::new(i, services());
        assert_eq!(run(&s(0), &m, &Map::new()).await.unwrap(), "FM");
        assert_eq!(run(&s(1), &m, &Map::new()).await.unwrap(), "FF");
        assert_eq!(run(&s(2), &m, &Map::new()).await.unwrap(), "");
    }
}
