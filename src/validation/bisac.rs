//! BISAC subject codes: embedded table, stripping and nearest-code lookup.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

/// Embedded BISAC table (code, heading).
const BISAC_CODES: &[(&str, &str)] = &[
    ("ANT000000", "ANTIQUES & COLLECTIBLES / General"),
    ("ARC000000", "ARCHITECTURE / General"),
    ("ART000000", "ART / General"),
    ("BIO000000", "BIOGRAPHY & AUTOBIOGRAPHY / General"),
    ("BIO006000", "BIOGRAPHY & AUTOBIOGRAPHY / Historical"),
    ("BUS000000", "BUSINESS & ECONOMICS / General"),
    ("BUS071000", "BUSINESS & ECONOMICS / Leadership"),
    ("CKB000000", "COOKING / General"),
    ("COM000000", "COMPUTERS / General"),
    ("COM004000", "COMPUTERS / Artificial Intelligence / General"),
    ("CRA000000", "CRAFTS & HOBBIES / General"),
    ("DRA000000", "DRAMA / General"),
    ("EDU000000", "EDUCATION / General"),
    ("FAM000000", "FAMILY & RELATIONSHIPS / General"),
    ("FIC000000", "FICTION / General"),
    ("FIC009000", "FICTION / Fantasy / General"),
    ("FIC014000", "FICTION / Historical / General"),
    ("FIC019000", "FICTION / Literary"),
    ("FIC022000", "FICTION / Mystery & Detective / General"),
    ("FIC028000", "FICTION / Science Fiction / General"),
    ("FIC031000", "FICTION / Thrillers / General"),
    ("GAM000000", "GAMES & ACTIVITIES / General"),
    ("HEA000000", "HEALTH & FITNESS / General"),
    ("HIS000000", "HISTORY / General"),
    ("HIS027000", "HISTORY / Military / General"),
    ("HIS036000", "HISTORY / United States / General"),
    ("HIS037010", "HISTORY / Medieval"),
    ("HOM000000", "HOUSE & HOME / General"),
    ("HUM000000", "HUMOR / General"),
    ("JNF000000", "JUVENILE NONFICTION / General"),
    ("JUV000000", "JUVENILE FICTION / General"),
    ("LAN000000", "LANGUAGE ARTS & DISCIPLINES / General"),
    ("LAW000000", "LAW / General"),
    ("LCO000000", "LITERARY COLLECTIONS / General"),
    ("LIT000000", "LITERARY CRITICISM / General"),
    ("MAT000000", "MATHEMATICS / General"),
    ("MED000000", "MEDICAL / General"),
    ("MUS000000", "MUSIC / General"),
    ("NAT000000", "NATURE / General"),
    ("NON000000", "NON-CLASSIFIABLE"),
    ("OCC000000", "BODY, MIND & SPIRIT / General"),
    ("PER000000", "PERFORMING ARTS / General"),
    ("PET000000", "PETS / General"),
    ("PHI000000", "PHILOSOPHY / General"),
    ("PHI005000", "PHILOSOPHY / Ethics & Moral Philosophy"),
    ("PHO000000", "PHOTOGRAPHY / General"),
    ("POE000000", "POETRY / General"),
    ("POL000000", "POLITICAL SCIENCE / General"),
    ("PSY000000", "PSYCHOLOGY / General"),
    ("REF000000", "REFERENCE / General"),
    ("REL000000", "RELIGION / General"),
    ("SCI000000", "SCIENCE / General"),
    ("SCI004000", "SCIENCE / Astronomy"),
    ("SCI034000", "SCIENCE / History"),
    ("SEL000000", "SELF-HELP / General"),
    ("SOC000000", "SOCIAL SCIENCE / General"),
    ("SPO000000", "SPORTS & RECREATION / General"),
    ("STU000000", "STUDY AIDS / General"),
    ("TEC000000", "TECHNOLOGY & ENGINEERING / General"),
    ("TRA000000", "TRANSPORTATION / General"),
    ("TRU000000", "TRUE CRIME / General"),
    ("TRV000000", "TRAVEL / General"),
    ("YAF000000", "YOUNG ADULT FICTION / General"),
    ("YAN000000", "YOUNG ADULT NONFICTION / General"),
];

fn code_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Z]{3}\d{6})\s*[-:]?\s*").expect("static regex"))
}

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{3}\d{6}$").expect("static regex"))
}

/// Remove a leading BISAC code: `"FIC000000 FICTION / General"` →
/// `"FICTION / General"`. Text without a code prefix is returned unchanged.
pub fn strip_bisac_code(value: &str) -> String {
    let re = code_prefix_regex();
    match re.find(value) {
        Some(m) if m.end() < value.len() => value[m.end()..].trim().to_string(),
        _ => value.to_string(),
    }
}

/// Split a semicolon / comma / newline separated list of BISAC entries.
pub fn split_bisac_list(value: &str) -> Vec<String> {
    value
        .split([';', '\n'])
        .flat_map(|part| {
            // commas appear inside headings ("BODY, MIND & SPIRIT"), so only
            // split on them when every piece is a bare code
            let pieces: Vec<&str> = part.split(',').map(str::trim).collect();
            if pieces.len() > 1 && pieces.iter().all(|p| code_regex().is_match(p)) {
                pieces.into_iter().map(str::to_string).collect::<Vec<_>>()
            } else {
                vec![part.trim().to_string()]
            }
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Result of checking one BISAC entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BisacCheck {
    Valid { code: String, heading: String },
    Suggested { input: String, code: String, heading: String },
    Invalid { input: String },
}

impl BisacCheck {
    /// Heading to emit, valid or suggested.
    pub fn heading(&self) -> Option<&str> {
        match self {
            Self::Valid { heading, .. } | Self::Suggested { heading, .. } => Some(heading),
            Self::Invalid { .. } => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Valid { code, .. } | Self::Suggested { code, .. } => Some(code),
            Self::Invalid { .. } => None,
        }
    }
}

/// BISAC lookup service.
#[derive(Debug, Clone)]
pub struct BisacValidator {
    by_code: BTreeMap<String, String>,
    by_heading: HashMap<String, String>,
}

impl Default for BisacValidator {
    fn default() -> Self {
        Self::from_entries(BISAC_CODES.iter().map(|(c, h)| (c.to_string(), h.to_string())))
    }
}

impl BisacValidator {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let by_code: BTreeMap<String, String> = entries.into_iter().collect();
        let by_heading = by_code
            .iter()
            .map(|(code, heading)| (heading.to_uppercase(), code.clone()))
            .collect();
        Self { by_code, by_heading }
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.by_code.contains_key(code.trim())
    }

    pub fn heading_for(&self, code: &str) -> Option<&str> {
        self.by_code.get(code.trim()).map(String::as_str)
    }

    pub fn code_for_heading(&self, heading: &str) -> Option<&str> {
        self.by_heading
            .get(&heading.trim().to_uppercase())
            .map(String::as_str)
    }

    /// Check a code, a heading, or a `"CODE Heading"` pair.
    pub fn check(&self, input: &str) -> BisacCheck {
        let input = input.trim();
        let code = code_prefix_regex()
            .captures(input)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let heading = strip_bisac_code(input);

        if let Some(code) = code.as_deref() {
            if let Some(h) = self.heading_for(code) {
                return BisacCheck::Valid { code: code.to_string(), heading: h.to_string() };
            }
        }
        if let Some(c) = self.code_for_heading(&heading) {
            return BisacCheck::Valid { code: c.to_string(), heading: self.by_code[c].clone() };
        }

        let suggestion = code
            .as_deref()
            .and_then(|c| self.suggest_for_code(c))
            .or_else(|| self.suggest_for_heading(&heading));

        match suggestion {
            Some(code) => {
                debug!("BISAC '{}' unknown, suggesting {}", input, code);
                BisacCheck::Suggested {
                    input: input.to_string(),
                    heading: self.by_code[&code].clone(),
                    code,
                }
            }
            None => BisacCheck::Invalid { input: input.to_string() },
        }
    }

    /// Nearest known code with the same three-letter prefix, by numeric distance.
    pub fn suggest_for_code(&self, code: &str) -> Option<String> {
        if !code_regex().is_match(code) {
            return None;
        }
        let (prefix, digits) = code.split_at(3);
        let target: i64 = digits.parse().ok()?;
        self.by_code
            .keys()
            .filter(|c| c.starts_with(prefix))
            .min_by_key(|c| {
                let n: i64 = c[3..].parse().unwrap_or(0);
                (n - target).abs()
            })
            .cloned()
    }

    /// Known heading sharing the top-level category, preferring `/ General`.
    pub fn suggest_for_heading(&self, heading: &str) -> Option<String> {
        let top = heading.split('/').next()?.trim().to_uppercase();
        if top.is_empty() {
            return None;
        }
        let mut candidates: Vec<(&String, &String)> = self
            .by_code
            .iter()
            .filter(|(_, h)| h.split('/').next().map(|t| t.trim().to_uppercase()) == Some(top.clone()))
            .collect();
        candidates.sort_by_key(|(_, h)| !h.ends_with("/ General"));
        candidates.first().map(|(c, _)| (*c).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bisac_code() {
        assert_eq!(strip_bisac_code("FIC000000 FICTION / General"), "FICTION / General");
        assert_eq!(strip_bisac_code("FICTION / General"), "FICTION / General");
        assert_eq!(strip_bisac_code("HIS027000 - HISTORY / Military / General"), "HISTORY / Military / General");
        assert_eq!(strip_bisac_code("FIC000000"), "FIC000000");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let once = strip_bisac_code("SCI004000 SCIENCE / Astronomy");
        assert_eq!(strip_bisac_code(&once), once);
    }

    #[test]
    fn test_check_code_heading_and_pair() {
        let v = BisacValidator::default();
        assert_eq!(v.check("FIC019000").heading(), Some("FICTION / Literary"));
        assert_eq!(v.check("fiction / literary").code(), Some("FIC019000"));
        assert_eq!(v.check("SCI004000 SCIENCE / Astronomy").code(), Some("SCI004000"));
    }

    #[test]
    fn test_suggests_nearest_code() {
        let v = BisacValidator::default();
        match v.check("HIS027500") {
            BisacCheck::Suggested { code, .. } => assert_eq!(code, "HIS027000"),
            other => panic!("expected suggestion, got {:?}", other),
        }
        match v.check("HISTORY / Ancient / Rome") {
            BisacCheck::Suggested { code, .. } => assert_eq!(code, "HIS000000"),
            other => panic!("expected suggestion, got {:?}", other),
        }
        assert!(matches!(v.check("ZZZ123456"), BisacCheck::Invalid { .. }));
    }

    #[test]
    fn test_split_bisac_list() {
        assert_eq!(split_bisac_list("FIC000000, HIS000000"), vec!["FIC000000", "HIS000000"]);
        assert_eq!(
            split_bisac_list("BODY, MIND & SPIRIT / General; FICTION / General"),
            vec!["BODY, MIND & SPIRIT / General", "FICTION / General"]
        );
    }
}
