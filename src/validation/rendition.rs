//! Valid LSI rendition / booktype strings.

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

pub const RENDITION_BOOKTYPES_FILE: &str = "lsi_valid_rendition_booktypes.txt";

const DEFAULT_BOOKTYPES: &[&str] = &[
    "Perfect Bound",
    "Case Laminate",
    "Cloth w/ Jacket",
    "Cloth w/ Jacket on Case Laminate",
    "Saddle Stitch",
    "Coil Bound",
];

/// Booktype list, read from disk once per instance.
#[derive(Debug, Default)]
pub struct RenditionBooktypes {
    path: Option<PathBuf>,
    cache: OnceLock<Vec<String>>,
}

impl RenditionBooktypes {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cache: OnceLock::new(),
        }
    }

    pub fn booktypes(&self) -> &[String] {
        self.cache.get_or_init(|| {
            let Some(path) = self.path.as_ref() else {
                return defaults();
            };
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let list: Vec<String> = content
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(str::to_string)
                        .collect();
                    info!("Loaded {} rendition booktypes from {:?}", list.len(), path);
                    if list.is_empty() {
                        defaults()
                    } else {
                        list
                    }
                }
                Err(e) => {
                    warn!("Could not read {:?} ({}), using built-in booktypes", path, e);
                    defaults()
                }
            }
        })
    }

    /// Canonical spelling of `value` when it is a valid booktype.
    pub fn canonical(&self, value: &str) -> Option<&str> {
        let wanted = value.trim().to_lowercase();
        self.booktypes()
            .iter()
            .find(|b| b.to_lowercase() == wanted)
            .map(String::as_str)
    }

    /// Map a binding description ("paperback", "hardcover") to a booktype.
    pub fn for_binding(&self, binding: &str) -> Option<&str> {
        if let Some(exact) = self.canonical(binding) {
            return Some(exact);
        }
        let lower = binding.trim().to_lowercase();
        let guess = if lower.contains("paper") || lower.contains("perfect") || lower.contains("soft") {
            "Perfect Bound"
        } else if lower.contains("jacket") {
            "Cloth w/ Jacket"
        } else if lower.contains("hard") || lower.contains("case") {
            "Case Laminate"
        } else if lower.contains("saddle") || lower.contains("stapl") {
            "Saddle Stitch"
        } else if lower.contains("coil") || lower.contains("spiral") {
            "Coil Bound"
        } else {
            return None;
        };
        self.canonical(guess)
    }
}

fn defaults() -> Vec<String> {
    DEFAULT_BOOKTYPES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_binding_guess() {
        let b = RenditionBooktypes::default();
        assert_eq!(b.canonical("perfect bound"), Some("Perfect Bound"));
        assert_eq!(b.for_binding("Paperback"), Some("Perfect Bound"));
        assert_eq!(b.for_binding("Hardcover"), Some("Case Laminate"));
        assert_eq!(b.for_binding("scroll"), None);
    }

    #[test]
    fn test_file_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RENDITION_BOOKTYPES_FILE);
        std::fs::write(&path, "Perfect Bound\n# comment\nDigital Only\n").unwrap();
        let b = RenditionBooktypes::from_file(&path);
        assert_eq!(b.booktypes().len(), 2);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(b.canonical("digital only"), Some("Digital Only"));
    }
}
