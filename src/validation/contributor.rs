//! LSI contributor role codes.
//!
//! Codes come from `lsi_valid_contributor_codes.csv` (`code,description`);
//! the embedded table is used when the file is absent or unreadable.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const CONTRIBUTOR_CODES_FILE: &str = "lsi_valid_contributor_codes.csv";

const DEFAULT_ROLES: &[(&str, &str)] = &[
    ("A", "By (author)"),
    ("B", "Edited by"),
    ("C", "Compiled by"),
    ("D", "Designed by"),
    ("E", "Epilogue by"),
    ("F", "Foreword by"),
    ("G", "Guest editor"),
    ("H", "Photographs by"),
    ("I", "Illustrated by"),
    ("J", "Adapted by"),
    ("K", "Contributions by"),
    ("L", "Afterword by"),
    ("M", "Commentary by"),
    ("N", "Narrated by"),
    ("O", "Original author"),
    ("P", "Preface by"),
    ("Q", "Prologue by"),
    ("R", "Read by"),
    ("S", "Selected by"),
    ("T", "Translated by"),
    ("U", "Introduction by"),
    ("V", "Cover design by"),
    ("W", "With"),
    ("X", "Annotated by"),
    ("Y", "Maps by"),
    ("Z", "Other"),
];

/// Plain-language role names operators and LLMs use.
const ROLE_SYNONYMS: &[(&str, &str)] = &[
    ("author", "A"),
    ("writer", "A"),
    ("editor", "B"),
    ("compiler", "C"),
    ("designer", "D"),
    ("photographer", "H"),
    ("illustrator", "I"),
    ("adapter", "J"),
    ("contributor", "K"),
    ("narrator", "N"),
    ("translator", "T"),
    ("annotator", "X"),
];

#[derive(Debug, Clone)]
pub struct ContributorRoleValidator {
    roles: BTreeMap<String, String>,
}

impl Default for ContributorRoleValidator {
    fn default() -> Self {
        Self {
            roles: DEFAULT_ROLES
                .iter()
                .map(|(c, d)| (c.to_string(), d.to_string()))
                .collect(),
        }
    }
}

impl ContributorRoleValidator {
    /// Load codes from `dir/lsi_valid_contributor_codes.csv`, falling back to
    /// the embedded table.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONTRIBUTOR_CODES_FILE);
        if !path.exists() {
            return Self::default();
        }
        match read_codes(&path) {
            Ok(roles) if !roles.is_empty() => {
                info!("Loaded {} contributor codes from {:?}", roles.len(), path);
                Self { roles }
            }
            Ok(_) => {
                warn!("No contributor codes in {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read contributor codes: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn description(&self, code: &str) -> Option<&str> {
        self.roles.get(&code.trim().to_uppercase()).map(String::as_str)
    }

    /// Resolve a role code or role name to a valid code.
    pub fn resolve(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let upper = trimmed.to_uppercase();
        if self.roles.contains_key(&upper) {
            return Some(upper);
        }

        let lower = trimmed.to_lowercase();
        if let Some((code, _)) = self
            .roles
            .iter()
            .find(|(_, description)| description.to_lowercase() == lower)
        {
            return Some(code.clone());
        }

        ROLE_SYNONYMS
            .iter()
            .find(|(name, _)| lower == *name || lower.trim_end_matches('s') == *name)
            .map(|(_, code)| code.to_string())
            .filter(|code| self.roles.contains_key(code))
    }
}

fn read_codes(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let mut roles = BTreeMap::new();
    for record in reader.records() {
        let record = record.context("Failed to read contributor code record")?;
        let code = record.get(0).unwrap_or_default().trim().to_uppercase();
        let description = record.get(1).unwrap_or_default().trim().to_string();
        if !code.is_empty() {
            roles.insert(code, description);
        }
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_codes_and_names() {
        let v = ContributorRoleValidator::default();
        assert_eq!(v.resolve("a").as_deref(), Some("A"));
        assert_eq!(v.resolve("Author").as_deref(), Some("A"));
        assert_eq!(v.resolve("Translated by").as_deref(), Some("T"));
        assert_eq!(v.resolve("editors").as_deref(), Some("B"));
        assert_eq!(v.resolve("Chief Vibes Officer"), None);
    }

    #[test]
    fn test_load_from_csv_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ContributorRoleValidator::load(dir.path());
        assert_eq!(missing.description("I"), Some("Illustrated by"));

        std::fs::write(
            dir.path().join(CONTRIBUTOR_CODES_FILE),
            "code,description\nA,Author\nB,Editor\n",
        )
        .unwrap();
        let loaded = ContributorRoleValidator::load(dir.path());
        assert_eq!(loaded.description("B"), Some("Editor"));
        assert_eq!(loaded.description("I"), None);
    }
}
