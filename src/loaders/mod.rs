//! Directory-backed publisher, imprint and tranche configurations.
//!
//! Each entity kind lives in its own directory of JSON files
//! (`configs/tranches/*.json` and so on). A manager scans the directory once,
//! keeps the parsed configs in memory, and can synthesize new entities from an
//! existing one used as a template.

pub mod imprint;
pub mod publisher;
pub mod tranche;

pub use imprint::ImprintConfig;
pub use publisher::PublisherConfig;
pub use tranche::TrancheConfig;

use crate::config::{deep_merge, ConfigurationContext, ConfigurationLevel};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A named configuration entity stored as one JSON file.
pub trait EntityConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Directory name under the config root.
    const KIND: &'static str;

    fn name(&self) -> &str;
    fn set_name(&mut self, name: &str);

    /// Configuration values this entity contributes to resolution.
    fn defaults(&self) -> Map<String, Value>;

    /// `LSI header -> strategy spec` entries.
    fn field_mappings(&self) -> &Map<String, Value>;
}

/// In-memory set of one entity kind, keyed by name.
#[derive(Debug)]
pub struct EntityConfigManager<T> {
    dir: PathBuf,
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T: EntityConfig> EntityConfigManager<T> {
    /// Empty manager writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load every `*.json` file of `config_root/<KIND>/`. A missing directory
    /// yields an empty manager; files that fail to parse are skipped.
    pub fn load_from_dir(config_root: &Path) -> Result<Self> {
        let manager = Self::new(config_root.join(T::KIND));
        if !manager.dir.exists() {
            debug!("No {} directory at {:?}", T::KIND, manager.dir);
            return Ok(manager);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&manager.dir)
            .with_context(|| format!("Failed to read {:?}", manager.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            match Self::read_entity(&path) {
                Ok(entity) => {
                    info!("Loaded {} config: {} from {:?}", T::KIND, entity.name(), path);
                    manager.insert(entity);
                }
                Err(e) => warn!("Skipping {:?}: {:#}", path, e),
            }
        }
        Ok(manager)
    }

    fn read_entity(path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {:?}", path))?;
        let mut entity: T =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse config: {:?}", path))?;
        if entity.name().trim().is_empty() {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            entity.set_name(stem);
        }
        Ok(entity)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entity names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Defaults of `name`, empty when unknown.
    pub fn defaults(&self, name: &str) -> Map<String, Value> {
        self.get(name).map(|e| e.defaults()).unwrap_or_default()
    }

    /// Field mappings of `name`, empty when unknown.
    pub fn field_mappings(&self, name: &str) -> Map<String, Value> {
        self.get(name).map(|e| e.field_mappings().clone()).unwrap_or_default()
    }

    /// Add or replace an entity; returns the previous one with that name.
    pub fn insert(&self, entity: T) -> Option<T> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.name().to_string(), entity)
    }

    /// Copy `template` under `new_name`, deep-merging `overrides` over it.
    /// The new entity is stored in memory; call [`Self::save`] to persist it.
    pub fn create_from_template(&self, template: &str, new_name: &str, overrides: Map<String, Value>) -> Result<T> {
        let base = self
            .get(template)
            .with_context(|| format!("Unknown {} template: {}", T::KIND, template))?;
        if new_name.trim().is_empty() {
            anyhow::bail!("New {} name is empty", T::KIND);
        }
        if self.get(new_name).is_some() {
            anyhow::bail!("{} config '{}' already exists", T::KIND, new_name);
        }

        let mut value = serde_json::to_value(&base).context("Failed to serialize template")?;
        deep_merge(&mut value, Value::Object(overrides));
        let mut entity: T = serde_json::from_value(value).context("Template overrides do not fit the config schema")?;
        entity.set_name(new_name);

        info!("Created {} config '{}' from template '{}'", T::KIND, new_name, template);
        self.insert(entity.clone());
        Ok(entity)
    }

    /// Write `name` to `<dir>/<name>.json`.
    pub fn save(&self, name: &str) -> Result<PathBuf> {
        let entity = self.get(name).with_context(|| format!("Unknown {} config: {}", T::KIND, name))?;
        std::fs::create_dir_all(&self.dir).with_context(|| format!("Failed to create {:?}", self.dir))?;
        let path = self.dir.join(format!("{}.json", file_stem_for(name)));
        let text = serde_json::to_string_pretty(&entity)?;
        std::fs::write(&path, text).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

fn file_stem_for(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Publisher, imprint and tranche managers over one config root.
#[derive(Debug)]
pub struct ConfigHierarchy {
    pub publishers: EntityConfigManager<PublisherConfig>,
    pub imprints: EntityConfigManager<ImprintConfig>,
    pub tranches: EntityConfigManager<TrancheConfig>,
}

impl ConfigHierarchy {
    pub fn load(config_root: &Path) -> Result<Self> {
        let hierarchy = Self {
            publishers: EntityConfigManager::load_from_dir(config_root)?,
            imprints: EntityConfigManager::load_from_dir(config_root)?,
            tranches: EntityConfigManager::load_from_dir(config_root)?,
        };
        info!(
            "Config hierarchy: {} publishers, {} imprints, {} tranches",
            hierarchy.publishers.len(),
            hierarchy.imprints.len(),
            hierarchy.tranches.len()
        );
        Ok(hierarchy)
    }

    pub fn empty(config_root: &Path) -> Self {
        Self {
            publishers: EntityConfigManager::new(config_root.join(PublisherConfig::KIND)),
            imprints: EntityConfigManager::new(config_root.join(ImprintConfig::KIND)),
            tranches: EntityConfigManager::new(config_root.join(TrancheConfig::KIND)),
        }
    }

    /// Fill the imprint and publisher a tranche (or imprint) belongs to when
    /// the caller did not name them.
    pub fn complete_context(&self, mut context: ConfigurationContext) -> ConfigurationContext {
        if let Some(tranche) = context.tranche_name.as_deref().and_then(|n| self.tranches.get(n)) {
            if context.imprint_name.is_none() && !tranche.imprint.trim().is_empty() {
                context.imprint_name = Some(tranche.imprint.clone());
            }
            if context.publisher_name.is_none() && !tranche.publisher.trim().is_empty() {
                context.publisher_name = Some(tranche.publisher.clone());
            }
        }
        if context.publisher_name.is_none() {
            if let Some(imprint) = context.imprint_name.as_deref().and_then(|n| self.imprints.get(n)) {
                if !imprint.publisher.trim().is_empty() {
                    context.publisher_name = Some(imprint.publisher.clone());
                }
            }
        }
        context
    }

    /// Field mappings for a context, later levels winning:
    /// publisher, then imprint, then tranche.
    pub fn field_mappings(&self, context: &ConfigurationContext) -> Map<String, Value> {
        let mut merged = Map::new();
        let layers = [
            context.publisher_name.as_deref().map(|n| self.publishers.field_mappings(n)),
            context.imprint_name.as_deref().map(|n| self.imprints.field_mappings(n)),
            context.tranche_name.as_deref().map(|n| self.tranches.field_mappings(n)),
        ];
        for mappings in layers.into_iter().flatten() {
            merged.extend(mappings);
        }
        merged
    }

    /// Names of every entity, by kind.
    pub fn listing(&self) -> BTreeMap<&'static str, Vec<String>> {
        BTreeMap::from([
            (PublisherConfig::KIND, self.publishers.list()),
            (ImprintConfig::KIND, self.imprints.list()),
            (TrancheConfig::KIND, self.tranches.list()),
        ])
    }

    /// Configuration level a kind directory feeds.
    pub fn level_of(kind: &str) -> Option<ConfigurationLevel> {
        match kind {
            PublisherConfig::KIND => Some(ConfigurationLevel::PublisherSpecific),
            ImprintConfig::KIND => Some(ConfigurationLevel::ImprintSpecific),
            TrancheConfig::KIND => Some(ConfigurationLevel::TrancheSpecific),
            _ => None,
        }
    }

    /// Create `name` from `template` within `kind`, write it to disk and
    /// return it as JSON. Unknown kinds are an error.
    pub fn create_from_template(&self, kind: &str, template: &str, name: &str, overrides: Map<String, Value>) -> Result<Value> {
        fn create<T: EntityConfig>(
            manager: &EntityConfigManager<T>,
            template: &str,
            name: &str,
            overrides: Map<String, Value>,
        ) -> Result<Value> {
            let created = manager.create_from_template(template, name, overrides)?;
            let path = manager.save(name)?;
            info!("Saved {} config '{}' to {:?}", T::KIND, name, path);
            Ok(serde_json::to_value(created)?)
        }
        match kind {
            PublisherConfig::KIND => create(&self.publishers, template, name, overrides),
            ImprintConfig::KIND => create(&self.imprints, template, name, overrides),
            TrancheConfig::KIND => create(&self.tranches, template, name, overrides),
            other => anyhow::bail!("Unknown config kind: {}", other),
        }
    }

    /// One entity as JSON, by kind directory name.
    pub fn entity_json(&self, kind: &str, name: &str) -> Option<Value> {
        match kind {
            PublisherConfig::KIND => self.publishers.get(name).and_then(|e| serde_json::to_value(e).ok()),
            ImprintConfig::KIND => self.imprints.get(name).and_then(|e| serde_json::to_value(e).ok()),
            TrancheConfig::KIND => self.tranches.get(name).and_then(|e| serde_json::to_value(e).ok()),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) fn write(root: &Path, rel: &str, value: Value) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    pub(crate) fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "publishers/nimble_books.json",
            json!({"publisher": "Nimble Books LLC", "lightning_source_account": "6024045", "field_mappings": {"LSI FlexField1": "default:Nimble"}}),
        );
        write(
            dir.path(),
            "imprints/xynapse_traces.json",
            json!({"publisher": "nimble_books", "imprint": "Xynapse Traces", "field_mappings": {"LSI FlexField1": "default:Xynapse", "LSI FlexField2": "default:X2"}}),
        );
        write(
            dir.path(),
            "tranches/summer_2025.json",
            json!({
                "publisher": "nimble_books",
                "imprint": "xynapse_traces",
                "tranche_info": {"season": "summer"},
                "field_overrides": {"Series Name": "Summer Reads"},
                "blank_fields": ["Review Quote(s)"],
                "territorial_rights": "US, CA",
                "field_mappings": {"LSI FlexField2": "default:Tranche"}
            }),
        );
        std::fs::write(dir.path().join("tranches/broken.json"), "{not json").unwrap();
        dir
    }

    #[test]
    fn test_load_skips_broken_files_and_names_by_stem() {
        let dir = fixture();
        let tranches: EntityConfigManager<TrancheConfig> = EntityConfigManager::load_from_dir(dir.path()).unwrap();
        assert_eq!(tranches.list(), vec!["summer_2025".to_string()]);
        let defaults = tranches.defaults("summer_2025");
        assert_eq!(defaults["territorial_rights"], json!("US, CA"));
        assert!(tranches.defaults("nope").is_empty());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let imprints: EntityConfigManager<ImprintConfig> = EntityConfigManager::load_from_dir(dir.path()).unwrap();
        assert!(imprints.is_empty());
    }

    #[test]
    fn test_create_from_template_and_save() {
        let dir = fixture();
        let tranches: EntityConfigManager<TrancheConfig> = EntityConfigManager::load_from_dir(dir.path()).unwrap();
        let overrides = json!({"territorial_rights": "World", "tranche_info": {"season": "fall"}});
        let created = tranches
            .create_from_template("summer_2025", "fall_2025", overrides.as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(created.name, "fall_2025");
        assert_eq!(created.imprint, "xynapse_traces");
        assert_eq!(created.tranche_info["season"], json!("fall"));
        assert_eq!(created.defaults()["territorial_rights"], json!("World"));

        assert!(tranches.create_from_template("summer_2025", "fall_2025", Map::new()).is_err());
        assert!(tranches.create_from_template("missing", "x", Map::new()).is_err());

        let path = tranches.save("fall_2025").unwrap();
        assert!(path.ends_with("tranches/fall_2025.json"));
        let reloaded: EntityConfigManager<TrancheConfig> = EntityConfigManager::load_from_dir(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_hierarchy_creates_entity_by_kind() {
        let dir = fixture();
        let hierarchy = ConfigHierarchy::load(dir.path()).unwrap();
        let overrides = json!({"territorial_rights": "World"});
        let created = hierarchy
            .create_from_template("tranches", "summer_2025", "winter_2025", overrides.as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(created["imprint"], json!("xynapse_traces"));
        assert!(dir.path().join("tranches/winter_2025.json").exists());
        assert!(hierarchy.entity_json("tranches", "winter_2025").is_some());

        assert!(hierarchy.create_from_template("books", "summer_2025", "x", Map::new()).is_err());
        assert_eq!(ConfigHierarchy::level_of("imprints"), Some(ConfigurationLevel::ImprintSpecific));
        assert_eq!(ConfigHierarchy::level_of("books"), None);
    }

    #[test]
    fn test_hierarchy_completes_context_and_merges_mappings() {
        let dir = fixture();
        let hierarchy = ConfigHierarchy::load(dir.path()).unwrap();
        let context = hierarchy.complete_context(ConfigurationContext::new().with_tranche("summer_2025"));
        assert_eq!(context.imprint_name.as_deref(), Some("xynapse_traces"));
        assert_eq!(context.publisher_name.as_deref(), Some("nimble_books"));

        let mappings = hierarchy.field_mappings(&context);
        assert_eq!(mappings["LSI FlexField1"], json!("default:Xynapse"));
        assert_eq!(mappings["LSI FlexField2"], json!("default:Tranche"));

        assert!(hierarchy.entity_json("tranches", "summer_2025").is_some());
        assert!(hierarchy.entity_json("books", "x").is_none());
    }
}
