//! Contributor role codes.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::{CodexMetadata, MetadataField};
use crate::validation::SubjectServices;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Emits the LSI role code for one contributor slot.
///
/// Empty when the slot has no contributor name. A blank role falls back to
/// the slot's default code; an unrecognized role is logged and also falls
/// back, so a name is never emitted without a role.
pub struct ContributorRoleStrategy {
    name_field: MetadataField,
    role_field: MetadataField,
    default_code: String,
    services: Arc<SubjectServices>,
}

impl ContributorRoleStrategy {
    pub fn new(
        name_field: MetadataField,
        role_field: MetadataField,
        default_code: impl Into<String>,
        services: Arc<SubjectServices>,
    ) -> Self {
        Self {
            name_field,
            role_field,
            default_code: default_code.into(),
            services,
        }
    }

    /// Slot 1 of 3, with the conventional defaults: author for the first
    /// contributor, "contributions by" for the others.
    pub fn for_slot(slot: usize, services: Arc<SubjectServices>) -> Option<Self> {
        let (name, role, default) = match slot {
            1 => (MetadataField::ContributorOne, MetadataField::ContributorOneRole, "A"),
            2 => (MetadataField::ContributorTwo, MetadataField::ContributorTwoRole, "K"),
            3 => (MetadataField::ContributorThree, MetadataField::ContributorThreeRole, "K"),
            _ => return None,
        };
        Some(Self::new(name, role, default, services))
    }
}

#[async_trait]
impl MappingStrategy for ContributorRoleStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        if metadata.get(self.name_field).trim().is_empty() {
            return Ok(String::new());
        }
        let role = metadata.get(self.role_field);
        if role.trim().is_empty() {
            return Ok(self.default_code.clone());
        }
        match self.services.contributors.resolve(&role) {
            Some(code) => Ok(code),
            None if self.services.contributors.description(&self.default_code).is_some() => {
                warn!(
                    "Unknown contributor role '{}' in {}, using {}",
                    role, context.field_name, self.default_code
                );
                Ok(self.default_code.clone())
            }
            None => Err(MappingError::invalid(context.field_name, format!("'{}' is not a contributor role", role))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::Map;

    fn services() -> Arc<SubjectServices> {
        Arc::new(SubjectServices::default())
    }

    #[tokio::test]
    async fn test_roles_resolve_by_code_and_name() {
        let s = ContributorRoleStrategy::for_slot(2, services()).unwrap();
        let mut m = CodexMetadata::new("T", "A");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "");

        m.contributor_two = "B. Editor".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "K");
        m.contributor_two_role = "Editor".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "B");
        m.contributor_two_role = "translated by".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "T");
    }

    #[tokio::test]
    async fn test_author_defaults_and_unknown_role() {
        let s = ContributorRoleStrategy::for_slot(1, services()).unwrap();
        let mut m = CodexMetadata::new("T", "Jane Doe");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "A");
        m.contributor_one_role = "Chief Vibe Officer".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "A");
        assert!(ContributorRoleStrategy::for_slot(4, services()).is_none());
    }
}
