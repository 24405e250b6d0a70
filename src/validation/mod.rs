//! Subject-code lookup services and operator-facing row validation.
//!
//! The lookup tables are owned by a [`SubjectServices`] bundle that the
//! pipeline constructs once and hands to every strategy that needs it.

pub mod bisac;
pub mod contributor;
pub mod isbn;
pub mod rendition;
pub mod text;
pub mod thema;

use crate::metadata::parse_price;
use bisac::{BisacCheck, BisacValidator};
use contributor::ContributorRoleValidator;
use indexmap::IndexMap;
use rendition::{RenditionBooktypes, RENDITION_BOOKTYPES_FILE};
use serde::Serialize;
use std::path::Path;
use thema::{ThemaCheck, ThemaValidator};

/// Lookup services shared by the subject and contributor strategies.
#[derive(Debug, Default)]
pub struct SubjectServices {
    pub bisac: BisacValidator,
    pub thema: ThemaValidator,
    pub contributors: ContributorRoleValidator,
    pub renditions: RenditionBooktypes,
}

impl SubjectServices {
    /// Load file-backed tables from `resources_dir`, embedded tables otherwise.
    pub fn load(resources_dir: &Path) -> Self {
        Self {
            bisac: BisacValidator::default(),
            thema: ThemaValidator::default(),
            contributors: ContributorRoleValidator::load(resources_dir),
            renditions: RenditionBooktypes::from_file(resources_dir.join(RENDITION_BOOKTYPES_FILE)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One operator-facing finding about a mapped row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into(), severity: Severity::Error }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into(), severity: Severity::Warning }
    }
}

const REQUIRED_COLUMNS: &[&str] = &[
    "ISBN or SKU",
    "Title",
    "Publisher",
    "Contributor One",
    "Pub Date",
    "US Suggested List Price",
    "BISAC Category",
];

/// Check a mapped LSI row. Only columns present in the row are checked, so
/// partial header lists validate cleanly.
pub fn validate_row(row: &IndexMap<String, String>, services: &SubjectServices) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let get = |name: &str| row.get(name).map(|v| v.trim());

    for &column in REQUIRED_COLUMNS {
        if let Some(value) = get(column) {
            if value.is_empty() {
                issues.push(ValidationIssue::error(column, "required column is empty"));
            }
        }
    }

    if let Some(isbn) = get("ISBN or SKU").filter(|v| !v.is_empty()) {
        if !isbn::is_valid_isbn13(isbn) {
            issues.push(ValidationIssue::error("ISBN or SKU", format!("'{}' is not a valid ISBN-13", isbn)));
        }
    }

    if let Some(price) = get("US Suggested List Price").filter(|v| !v.is_empty()) {
        if parse_price(price).map(|p| p <= 0.0).unwrap_or(true) {
            issues.push(ValidationIssue::error("US Suggested List Price", format!("'{}' is not a price", price)));
        }
    }

    for column in ["BISAC Category", "BISAC Category 2", "BISAC Category 3"] {
        if let Some(value) = get(column).filter(|v| !v.is_empty()) {
            match services.bisac.check(value) {
                BisacCheck::Valid { .. } => {}
                BisacCheck::Suggested { heading, .. } => issues.push(ValidationIssue::warning(
                    column,
                    format!("'{}' is not a known heading; nearest is '{}'", value, heading),
                )),
                BisacCheck::Invalid { .. } => {
                    issues.push(ValidationIssue::error(column, format!("'{}' is not a BISAC heading", value)))
                }
            }
        }
    }

    for column in ["Thema Subject 1", "Thema Subject 2", "Thema Subject 3"] {
        if let Some(value) = get(column).filter(|v| !v.is_empty()) {
            if let ThemaCheck::Invalid { .. } = services.thema.check(value) {
                issues.push(ValidationIssue::warning(column, format!("'{}' is not a Thema code", value)));
            }
        }
    }

    if let Some(desc) = row.get("Short Description") {
        if desc.len() > text::SHORT_DESCRIPTION_MAX_BYTES {
            issues.push(ValidationIssue::error(
                "Short Description",
                format!("{} bytes exceeds {}", desc.len(), text::SHORT_DESCRIPTION_MAX_BYTES),
            ));
        }
    }

    if let Some(booktype) = get("Rendition /Booktype").filter(|v| !v.is_empty()) {
        if services.renditions.canonical(booktype).is_none() {
            issues.push(ValidationIssue::warning("Rendition /Booktype", format!("'{}' is not a listed booktype", booktype)));
        }
    }

    for column in ["Contributor One Role", "Contributor Two Role", "Contributor Three Role"] {
        if let Some(role) = get(column).filter(|v| !v.is_empty()) {
            if services.contributors.description(role).is_none() {
                issues.push(ValidationIssue::warning(column, format!("'{}' is not a contributor code", role)));
            }
        }
    }

    issues
}
