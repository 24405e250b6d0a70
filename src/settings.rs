//! Process settings from the environment (after `.env` is loaded).

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub output_dir: PathBuf,
    pub bind_addr: String,
    /// Whether an OpenRouter key is configured.
    pub llm_enabled: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            config_dir: var("LSI_CONFIG_DIR", "configs").into(),
            resources_dir: var("LSI_RESOURCES_DIR", "resources").into(),
            output_dir: var("LSI_OUTPUT_DIR", "output").into(),
            bind_addr: var("LSI_BIND_ADDR", "0.0.0.0:3000"),
            llm_enabled: lookup("OPENROUTER_API_KEY").is_some_and(|k| !k.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_and_overrides() {
        let defaults = Settings::from_lookup(|_| None);
        assert_eq!(defaults.config_dir, PathBuf::from("configs"));
        assert_eq!(defaults.bind_addr, "0.0.0.0:3000");
        assert!(!defaults.llm_enabled);

        let env: HashMap<&str, &str> = HashMap::from([
            ("LSI_CONFIG_DIR", "/srv/lsi/configs"),
            ("LSI_OUTPUT_DIR", " "),
            ("OPENROUTER_API_KEY", "sk-test"),
        ]);
        let s = Settings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.config_dir, PathBuf::from("/srv/lsi/configs"));
        assert_eq!(s.output_dir, PathBuf::from("output"));
        assert!(s.llm_enabled);
    }
}
