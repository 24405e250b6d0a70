//! Thema subject codes.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

const THEMA_CODES: &[(&str, &str)] = &[
    ("A", "The Arts"),
    ("AB", "The arts: general topics"),
    ("C", "Language and Linguistics"),
    ("D", "Biography, Literature and Literary studies"),
    ("DN", "Biography and non-fiction prose"),
    ("DNB", "Biography: general"),
    ("F", "Fiction and Related items"),
    ("FB", "Fiction: general and literary"),
    ("FF", "Crime and mystery fiction"),
    ("FL", "Science fiction"),
    ("FM", "Fantasy"),
    ("FV", "Historical fiction"),
    ("G", "Reference, Information and Interdisciplinary subjects"),
    ("J", "Society and Social Sciences"),
    ("JP", "Politics and government"),
    ("K", "Economics, Finance, Business and Management"),
    ("KJ", "Business and Management"),
    ("L", "Law"),
    ("M", "Medicine and Nursing"),
    ("N", "History and Archaeology"),
    ("NH", "History"),
    ("NHB", "General and world history"),
    ("P", "Mathematics and Science"),
    ("PD", "Science: general issues"),
    ("PG", "Astronomy, space and time"),
    ("Q", "Philosophy and Religion"),
    ("QD", "Philosophy"),
    ("QR", "Religion and beliefs"),
    ("R", "Earth Sciences, Geography, Environment, Planning"),
    ("S", "Sports and Active outdoor recreation"),
    ("T", "Technology, Engineering, Agriculture, Industrial processes"),
    ("U", "Computing and Information Technology"),
    ("UY", "Computer science"),
    ("UYQ", "Artificial intelligence"),
    ("V", "Health, Relationships and Personal development"),
    ("VS", "Self-help, personal development and practical advice"),
    ("W", "Lifestyle, Hobbies and Leisure"),
    ("WT", "Travel and holiday"),
    ("X", "Graphic novels, Comic books, Cartoons"),
    ("Y", "Children's, Teenage and Educational"),
    ("YF", "Children's / Teenage fiction and true stories"),
];

fn subject_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]{0,7}$").expect("static regex"))
}

fn qualifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-6][A-Z0-9\-]{0,8}$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThemaCheck {
    Valid { code: String },
    /// Well-formed qualifier code; qualifiers are not table-checked.
    Qualifier { code: String },
    Suggested { input: String, code: String },
    Invalid { input: String },
}

impl ThemaCheck {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Valid { code } | Self::Qualifier { code } | Self::Suggested { code, .. } => Some(code),
            Self::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThemaValidator {
    codes: BTreeMap<String, String>,
}

impl Default for ThemaValidator {
    fn default() -> Self {
        Self {
            codes: THEMA_CODES
                .iter()
                .map(|(c, d)| (c.to_string(), d.to_string()))
                .collect(),
        }
    }
}

impl ThemaValidator {
    pub fn description(&self, code: &str) -> Option<&str> {
        self.codes.get(code).map(String::as_str)
    }

    /// Check one code; unknown subject codes are walked up to the nearest
    /// known parent (`"FFHX"` → `"FF"`).
    pub fn check(&self, input: &str) -> ThemaCheck {
        // "FM Fantasy" and "FM: Fantasy" carry the code first
        let code = input
            .trim()
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()
            .unwrap_or_default()
            .to_uppercase();

        if qualifier_regex().is_match(&code) {
            return ThemaCheck::Qualifier { code };
        }
        if !subject_regex().is_match(&code) {
            return ThemaCheck::Invalid { input: input.to_string() };
        }
        if self.codes.contains_key(&code) {
            return ThemaCheck::Valid { code };
        }

        let mut parent = code.clone();
        while parent.len() > 1 {
            parent.pop();
            if self.codes.contains_key(&parent) {
                return ThemaCheck::Suggested { input: input.to_string(), code: parent };
            }
        }
        ThemaCheck::Invalid { input: input.to_string() }
    }
}

/// Split a list of Thema subjects on semicolons, commas or newlines.
pub fn split_thema_list(value: &str) -> Vec<String> {
    value
        .split([';', ',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_and_parent_suggestion() {
        let v = ThemaValidator::default();
        assert_eq!(v.check("FM"), ThemaCheck::Valid { code: "FM".into() });
        assert_eq!(v.check("fm Fantasy").code(), Some("FM"));
        assert_eq!(
            v.check("FFHX"),
            ThemaCheck::Suggested { input: "FFHX".into(), code: "FF".into() }
        );
    }

    #[test]
    fn test_qualifiers_and_garbage() {
        let v = ThemaValidator::default();
        assert!(matches!(v.check("1KBB"), ThemaCheck::Qualifier { .. }));
        assert!(matches!(v.check("?? unknown"), ThemaCheck::Invalid { .. }));
    }
}
