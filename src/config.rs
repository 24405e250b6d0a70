//! Multi-level configuration resolution.
//!
//! Values live in per-level tables and are resolved in fixed priority order:
//! field override > book > tranche > imprint > publisher > global default.
//! Context-scoped tables (one per tranche, imprint, publisher, book) are loaded
//! lazily from `configs/<kind>/<name>.json` the first time a resolution needs
//! them. In-memory tables are backed by `RwLock` for runtime edits.

use crate::error::ConfigError;
use crate::metadata::parse_price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Global defaults file, relative to the config directory.
pub const GLOBAL_CONFIG_FILE: &str = "default_lsi_config.json";

/// Configuration levels, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationLevel {
    FieldOverride,
    BookSpecific,
    TrancheSpecific,
    ImprintSpecific,
    PublisherSpecific,
    GlobalDefault,
}

impl ConfigurationLevel {
    /// Resolution order.
    pub const PRIORITY: [ConfigurationLevel; 6] = [
        ConfigurationLevel::FieldOverride,
        ConfigurationLevel::BookSpecific,
        ConfigurationLevel::TrancheSpecific,
        ConfigurationLevel::ImprintSpecific,
        ConfigurationLevel::PublisherSpecific,
        ConfigurationLevel::GlobalDefault,
    ];

    /// Directory under the config root holding per-entity files for this level.
    pub fn subdir(self) -> Option<&'static str> {
        match self {
            Self::BookSpecific => Some("books"),
            Self::TrancheSpecific => Some("tranches"),
            Self::ImprintSpecific => Some("imprints"),
            Self::PublisherSpecific => Some("publishers"),
            Self::FieldOverride | Self::GlobalDefault => None,
        }
    }

    /// Keys in an entity file that name a parent entity rather than a value.
    /// They stay out of the value tables so a tranche's `"publisher": "nimble_books"`
    /// never shadows the publisher's display name.
    pub fn reference_keys(self) -> &'static [&'static str] {
        match self {
            Self::TrancheSpecific => &["publisher", "imprint"],
            Self::ImprintSpecific => &["publisher"],
            _ => &[],
        }
    }

    /// The identifier in `context` that selects this level's scoped table.
    pub fn context_id(self, context: &ConfigurationContext) -> Option<&str> {
        let id = match self {
            Self::BookSpecific => context.book_isbn.as_deref(),
            Self::TrancheSpecific => context.tranche_name.as_deref(),
            Self::ImprintSpecific => context.imprint_name.as_deref(),
            Self::PublisherSpecific => context.publisher_name.as_deref(),
            Self::FieldOverride | Self::GlobalDefault => None,
        };
        id.filter(|s| !s.trim().is_empty())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldOverride => "field_override",
            Self::BookSpecific => "book_specific",
            Self::TrancheSpecific => "tranche_specific",
            Self::ImprintSpecific => "imprint_specific",
            Self::PublisherSpecific => "publisher_specific",
            Self::GlobalDefault => "global_default",
        }
    }
}

impl fmt::Display for ConfigurationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationEntry {
    pub value: Value,
    pub level: ConfigurationLevel,
    pub source: String,
    #[serde(default)]
    pub description: String,
    pub last_modified: DateTime<Utc>,
}

impl ConfigurationEntry {
    pub fn new(
        value: Value,
        level: ConfigurationLevel,
        source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value,
            level,
            source: source.into(),
            description: description.into(),
            last_modified: Utc::now(),
        }
    }
}

/// Identifying keys for one resolution plus per-book field overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationContext {
    pub book_isbn: Option<String>,
    pub tranche_name: Option<String>,
    pub imprint_name: Option<String>,
    pub publisher_name: Option<String>,
    pub field_overrides: Map<String, Value>,
}

impl ConfigurationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(mut self, isbn: impl Into<String>) -> Self {
        self.book_isbn = Some(isbn.into());
        self
    }

    pub fn with_tranche(mut self, name: impl Into<String>) -> Self {
        self.tranche_name = Some(name.into());
        self
    }

    pub fn with_imprint(mut self, name: impl Into<String>) -> Self {
        self.imprint_name = Some(name.into());
        self
    }

    pub fn with_publisher(mut self, name: impl Into<String>) -> Self {
        self.publisher_name = Some(name.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: Value) -> Self {
        self.field_overrides.insert(key.into(), value);
        self
    }
}

/// Table address: a level plus an optional entity id (`None` = level-wide).
type ScopeKey = (ConfigurationLevel, Option<String>);
type Table = HashMap<String, ConfigurationEntry>;

/// Predicate applied to a value before `set_value` stores it.
pub type ValidationRule = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Registry of `key -> predicate` rules consulted by `set_value`.
#[derive(Clone, Default)]
pub struct ConfigurationValidator {
    rules: HashMap<String, ValidationRule>,
}

impl fmt::Debug for ConfigurationValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationValidator")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigurationValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the LSI keys operators edit most often.
    pub fn with_lsi_rules() -> Self {
        let mut v = Self::new();
        v.add_rule("lightning_source_account", |value| {
            value_as_text(value)
                .map(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        });
        v.add_rule("language_code", |value| {
            value
                .as_str()
                .map(|s| s.len() == 3 && s.chars().all(|c| c.is_ascii_lowercase()))
                .unwrap_or(false)
        });
        v.add_rule("list_price_usd", |value| {
            value_as_text(value)
                .and_then(|s| parse_price(&s))
                .map(|p| p > 0.0)
                .unwrap_or(false)
        });
        for key in [
            "us_wholesale_discount",
            "uk_wholesale_discount",
            "eu_wholesale_discount",
            "au_wholesale_discount",
            "ca_wholesale_discount",
            "wholesale_discount_percent",
        ] {
            v.add_rule(key, is_percentage);
        }
        v.add_rule("territorial_rights", |value| {
            value.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false)
        });
        v
    }

    pub fn add_rule<F>(&mut self, key: impl Into<String>, rule: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.rules.insert(key.into(), Arc::new(rule));
    }

    /// True when no rule is registered for `key` or the rule accepts `value`.
    pub fn validate(&self, key: &str, value: &Value) -> bool {
        self.rules.get(key).map(|rule| rule(value)).unwrap_or(true)
    }
}

fn is_percentage(value: &Value) -> bool {
    value_as_text(value)
        .and_then(|s| s.trim_end_matches('%').trim().parse::<f64>().ok())
        .map(|p| (0.0..=100.0).contains(&p))
        .unwrap_or(false)
}

/// String form of scalar JSON values.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One place a key is defined, for audit output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDefinition {
    pub level: ConfigurationLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub value: Value,
    pub source: String,
}

/// Resolution trace for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationInfo {
    pub key: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_level: Option<ConfigurationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub defined_at: Vec<LevelDefinition>,
}

/// Layered configuration with lazy per-context loading.
#[derive(Debug)]
pub struct MultiLevelConfiguration {
    config_dir: PathBuf,
    tables: RwLock<HashMap<ScopeKey, Table>>,
    attempted: RwLock<HashSet<ScopeKey>>,
    validator: ConfigurationValidator,
}

impl MultiLevelConfiguration {
    /// Create a configuration rooted at `config_dir`, loading the global
    /// defaults file if present.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let config = Self::empty(config_dir);
        let global = config.config_dir.join(GLOBAL_CONFIG_FILE);
        if global.exists() {
            config.load_configuration_file(&global, ConfigurationLevel::GlobalDefault, None);
        } else {
            debug!("No global config at {:?}", global);
        }
        config
    }

    /// Create a configuration without touching the filesystem.
    pub fn empty(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            tables: RwLock::new(HashMap::new()),
            attempted: RwLock::new(HashSet::new()),
            validator: ConfigurationValidator::with_lsi_rules(),
        }
    }

    pub fn with_validator(mut self, validator: ConfigurationValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Resolve `key`, returning `default` when no level defines it.
    pub fn get_value(&self, key: &str, context: &ConfigurationContext, default: Value) -> Value {
        self.resolve(key, context)
            .map(|(value, _)| value)
            .unwrap_or(default)
    }

    /// Resolve `key` as a non-empty string.
    pub fn get_string(&self, key: &str, context: &ConfigurationContext) -> Option<String> {
        self.resolve(key, context)
            .and_then(|(value, _)| value_as_text(&value))
            .filter(|s| !s.trim().is_empty())
    }

    /// Winning value and the level it came from (`None` for a context field
    /// override and for nothing found).
    fn resolve(
        &self,
        key: &str,
        context: &ConfigurationContext,
    ) -> Option<(Value, Option<ConfigurationEntry>)> {
        if let Some(value) = context.field_overrides.get(key) {
            if !value.is_null() {
                return Some((value.clone(), None));
            }
        }

        for level in ConfigurationLevel::PRIORITY {
            for scope in self.scopes_for(level, context) {
                let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
                if let Some(entry) = tables.get(&scope).and_then(|t| t.get(key)) {
                    return Some((entry.value.clone(), Some(entry.clone())));
                }
            }
        }
        None
    }

    /// Tables consulted for `level`, scoped first, materializing scoped
    /// tables on first use.
    fn scopes_for(&self, level: ConfigurationLevel, context: &ConfigurationContext) -> Vec<ScopeKey> {
        let mut scopes = Vec::with_capacity(2);
        if let Some(id) = level.context_id(context) {
            self.ensure_loaded(level, id);
            scopes.push((level, Some(id.to_string())));
        }
        scopes.push((level, None));
        scopes
    }

    /// Load `configs/<subdir>/<id>.json` once per `(level, id)`. Misses are
    /// remembered until [`Self::invalidate_context`] is called.
    fn ensure_loaded(&self, level: ConfigurationLevel, id: &str) {
        let key: ScopeKey = (level, Some(id.to_string()));
        {
            let attempted = self.attempted.read().unwrap_or_else(PoisonError::into_inner);
            if attempted.contains(&key) {
                return;
            }
        }
        self.attempted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);

        let Some(subdir) = level.subdir() else {
            return;
        };
        let file_name = format!("{}.json", sanitize_scope_id(id));
        let mut candidates = vec![self.config_dir.join(subdir).join(&file_name)];
        if level == ConfigurationLevel::ImprintSpecific {
            if let Some(parent) = self.config_dir.parent() {
                candidates.push(parent.join("imprints").join(&file_name));
            }
        }

        for path in candidates {
            if !path.exists() {
                continue;
            }
            if self.load_configuration_file(&path, level, Some(id)) {
                return;
            }
        }
        debug!("No {} configuration for '{}'", level, id);
    }

    /// Forget that `(level, id)` was attempted so the next resolution re-reads
    /// its file.
    pub fn invalidate_context(&self, level: ConfigurationLevel, id: &str) {
        let key: ScopeKey = (level, Some(id.to_string()));
        self.attempted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    /// Forget every lazily loaded context.
    pub fn invalidate_all(&self) {
        let mut attempted = self.attempted.write().unwrap_or_else(PoisonError::into_inner);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for key in attempted.drain() {
            tables.remove(&key);
        }
    }

    /// Store a value. Returns false if a validation rule rejects it.
    ///
    /// A `FieldOverride` with a context writes into that context's
    /// `field_overrides`; any other level with a context writes into the
    /// table scoped by the matching context id.
    pub fn set_value(
        &self,
        key: &str,
        value: Value,
        level: ConfigurationLevel,
        context: Option<&mut ConfigurationContext>,
        description: &str,
        source: &str,
    ) -> bool {
        if !self.validator.validate(key, &value) {
            warn!("Rejected configuration value for '{}' at {}: {}", key, level, value);
            return false;
        }

        let scope = match context {
            Some(ctx) if level == ConfigurationLevel::FieldOverride => {
                ctx.field_overrides.insert(key.to_string(), value);
                return true;
            }
            Some(ctx) => level.context_id(ctx).map(str::to_string),
            None => None,
        };

        let entry = ConfigurationEntry::new(value, level, source, description);
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((level, scope))
            .or_default()
            .insert(key.to_string(), entry);
        true
    }

    /// Resolution trace: the winning value and every level defining `key`.
    pub fn get_configuration_info(&self, key: &str, context: &ConfigurationContext) -> ConfigurationInfo {
        let resolved = self.resolve(key, context);
        let mut defined_at = Vec::new();

        if let Some(value) = context.field_overrides.get(key).filter(|v| !v.is_null()) {
            defined_at.push(LevelDefinition {
                level: ConfigurationLevel::FieldOverride,
                scope: Some("context".to_string()),
                value: value.clone(),
                source: "context".to_string(),
            });
        }

        for level in ConfigurationLevel::PRIORITY {
            for scope in self.scopes_for(level, context) {
                let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
                if let Some(entry) = tables.get(&scope).and_then(|t| t.get(key)) {
                    defined_at.push(LevelDefinition {
                        level,
                        scope: scope.1.clone(),
                        value: entry.value.clone(),
                        source: entry.source.clone(),
                    });
                }
            }
        }

        let (value, entry) = match resolved {
            Some((value, entry)) => (value, entry),
            None => (Value::Null, None),
        };
        let winning_level = match (&entry, defined_at.first()) {
            (Some(e), _) => Some(e.level),
            (None, Some(_)) => Some(ConfigurationLevel::FieldOverride),
            (None, None) => None,
        };

        ConfigurationInfo {
            key: key.to_string(),
            value,
            winning_level,
            source: entry
                .as_ref()
                .map(|e| e.source.clone())
                .or_else(|| defined_at.first().map(|d| d.source.clone())),
            description: entry.map(|e| e.description).filter(|d| !d.is_empty()),
            defined_at,
        }
    }

    /// Resolution trace for every key visible to `context`.
    pub fn list_all_configurations(&self, context: &ConfigurationContext) -> BTreeMap<String, ConfigurationInfo> {
        let mut keys: HashSet<String> = context.field_overrides.keys().cloned().collect();
        for level in ConfigurationLevel::PRIORITY {
            for scope in self.scopes_for(level, context) {
                let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
                if let Some(table) = tables.get(&scope) {
                    keys.extend(table.keys().cloned());
                }
            }
        }

        keys.into_iter()
            .map(|key| {
                let info = self.get_configuration_info(&key, context);
                (key, info)
            })
            .collect()
    }

    /// Load a JSON file into the table for `level` (scoped by `scope` when
    /// given). Nested objects are deep-merged into existing values.
    pub fn load_configuration_file(&self, path: &Path, level: ConfigurationLevel, scope: Option<&str>) -> bool {
        match self.try_load(path, level, scope) {
            Ok(count) => {
                info!("Loaded {} {} entries from {:?}", count, level, path);
                true
            }
            Err(e) => {
                warn!("Failed to load configuration: {}", e);
                false
            }
        }
    }

    fn try_load(&self, path: &Path, level: ConfigurationLevel, scope: Option<&str>) -> Result<usize, ConfigError> {
        let root = read_json_object(path)?;
        let source = path.display().to_string();
        let key: ScopeKey = (level, scope.map(str::to_string));

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(key).or_default();
        let references = if scope.is_some() { level.reference_keys() } else { &[] };
        let mut count = 0;

        for (name, raw) in root {
            if references.contains(&name.as_str()) {
                debug!("Skipping hierarchy reference '{}' in {}", name, source);
                continue;
            }
            count += 1;
            let incoming = entry_from_json(raw, level, &source);
            match table.get(&name) {
                Some(existing) if existing.value.is_object() && incoming.value.is_object() => {
                    let mut merged = existing.value.clone();
                    deep_merge(&mut merged, incoming.value.clone());
                    table.insert(name, ConfigurationEntry { value: merged, ..incoming });
                }
                _ => {
                    table.insert(name, incoming);
                }
            }
        }
        Ok(count)
    }

    /// Write the table for `level` / `scope` as structured entries.
    pub fn save_configuration_file(&self, path: &Path, level: ConfigurationLevel, scope: Option<&str>) -> bool {
        match self.try_save(path, level, scope) {
            Ok(()) => {
                info!("Saved {} configuration to {:?}", level, path);
                true
            }
            Err(e) => {
                warn!("Failed to save configuration: {}", e);
                false
            }
        }
    }

    fn try_save(&self, path: &Path, level: ConfigurationLevel, scope: Option<&str>) -> Result<(), ConfigError> {
        let key: ScopeKey = (level, scope.map(str::to_string));
        let output: BTreeMap<String, Value> = {
            let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
            tables
                .get(&key)
                .map(|table| {
                    table
                        .iter()
                        .map(|(k, e)| {
                            let v = serde_json::json!({
                                "value": e.value,
                                "description": e.description,
                                "last_modified": e.last_modified.to_rfc3339(),
                            });
                            (k.clone(), v)
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let display = path.display().to_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: display.clone(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(&output).map_err(|source| ConfigError::Json {
            path: display.clone(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io { path: display, source })
    }
}

/// Read a file whose root must be a JSON object.
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: display.clone(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject(display)),
    }
}

/// Structured entries are objects with a `value` key and nothing beyond the
/// entry metadata keys.
fn entry_from_json(raw: Value, level: ConfigurationLevel, source: &str) -> ConfigurationEntry {
    const ENTRY_KEYS: [&str; 4] = ["value", "description", "last_modified", "source"];

    if let Value::Object(obj) = &raw {
        let structured = obj.contains_key("value") && obj.keys().all(|k| ENTRY_KEYS.contains(&k.as_str()));
        if structured {
            let description = obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let last_modified = obj
                .get("last_modified")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            return ConfigurationEntry {
                value,
                level,
                source: source.to_string(),
                description,
                last_modified,
            };
        }
    }
    ConfigurationEntry::new(raw, level, source, "")
}

/// Recursively merge `incoming` into `base`. Objects merge key by key, any
/// other value replaces.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

/// Keep scope ids usable as file names.
fn sanitize_scope_id(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
