//! Field-mapping strategies and the registry that applies them.
//!
//! Each LSI column is produced by a [`MappingStrategy`]. The registry keeps
//! strategies in explicit [`StrategyLayer`]s; for a given column the highest
//! layer that has a strategy wins, so override precedence does not depend on
//! registration order.

pub mod basic;
pub mod builder;
pub mod contributors;
pub mod dates;
pub mod descriptions;
pub mod llm;
pub mod paths;
pub mod physical;
pub mod pricing;
pub mod subjects;
pub mod tranche;

use crate::config::{value_as_text, ConfigurationContext, MultiLevelConfiguration};
use crate::error::MappingError;
use crate::metadata::CodexMetadata;
use crate::report::{FieldFailure, RowReport};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces one output column for one book.
#[async_trait]
pub trait MappingStrategy: Send + Sync {
    /// Whether the strategy can run for this input. A `false` leaves the
    /// column empty without counting as a failure.
    fn validate_input(&self, _metadata: &CodexMetadata, _context: &MappingContext<'_>) -> bool {
        true
    }

    async fn map_field(
        &self,
        metadata: &CodexMetadata,
        context: &MappingContext<'_>,
    ) -> Result<String, MappingError>;
}

/// Per-column inputs handed to a strategy.
pub struct MappingContext<'a> {
    pub field_name: &'a str,
    pub lsi_headers: &'a [String],
    /// Columns already mapped for this row, in header order.
    pub current_row_data: &'a IndexMap<String, String>,
    /// Ad-hoc configuration supplied by the caller.
    pub config: &'a Map<String, Value>,
    pub configuration: Option<(&'a MultiLevelConfiguration, &'a ConfigurationContext)>,
}

impl<'a> MappingContext<'a> {
    /// Look a key up in the multi-level configuration, then in the ad-hoc
    /// config map.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        if let Some((configuration, context)) = self.configuration {
            let value = configuration.get_value(key, context, Value::Null);
            if !value.is_null() {
                return Some(value);
            }
        }
        self.config.get(key).filter(|v| !v.is_null()).cloned()
    }

    /// [`Self::lookup`] as a non-empty string.
    pub fn lookup_str(&self, key: &str) -> Option<String> {
        self.lookup(key)
            .and_then(|v| value_as_text(&v))
            .filter(|s| !s.trim().is_empty())
    }

    /// Value of a column mapped earlier in this row.
    pub fn row_value(&self, header: &str) -> Option<&str> {
        self.current_row_data
            .get(header)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Precedence layer for a registered strategy. Later variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyLayer {
    Base,
    Enhanced,
    TrancheAware,
}

/// A mapped row plus the report of what happened while mapping it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MappedRow {
    pub values: IndexMap<String, String>,
    pub report: RowReport,
}

/// Column name to layered strategies, in registration order.
#[derive(Default)]
pub struct FieldMappingRegistry {
    fields: IndexMap<String, BTreeMap<StrategyLayer, Arc<dyn MappingStrategy>>>,
    config: Map<String, Value>,
    configuration: Option<(Arc<MultiLevelConfiguration>, ConfigurationContext)>,
}

impl FieldMappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ad-hoc configuration visible to every strategy via `MappingContext::config`.
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Multi-level configuration and the base context for resolutions. The
    /// book ISBN is filled from each book's metadata when the context has none.
    pub fn with_configuration(
        mut self,
        configuration: Arc<MultiLevelConfiguration>,
        context: ConfigurationContext,
    ) -> Self {
        self.configuration = Some((configuration, context));
        self
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Register at the base layer, replacing any base strategy for the name.
    pub fn register_strategy(&mut self, field_name: impl Into<String>, strategy: impl MappingStrategy + 'static) {
        self.register_layered(StrategyLayer::Base, field_name, Arc::new(strategy));
    }

    /// Register at an explicit layer. The name keeps its original position.
    pub fn register_layered(
        &mut self,
        layer: StrategyLayer,
        field_name: impl Into<String>,
        strategy: Arc<dyn MappingStrategy>,
    ) {
        self.fields
            .entry(field_name.into())
            .or_default()
            .insert(layer, strategy);
    }

    /// Effective strategy for a column: the highest registered layer.
    pub fn strategy_for(&self, field_name: &str) -> Option<&Arc<dyn MappingStrategy>> {
        self.fields
            .get(field_name)
            .and_then(|layers| layers.values().next_back())
    }

    /// Layer whose strategy currently wins for `field_name`.
    pub fn winning_layer(&self, field_name: &str) -> Option<StrategyLayer> {
        self.fields
            .get(field_name)
            .and_then(|layers| layers.keys().next_back().copied())
    }

    pub fn has_strategy(&self, field_name: &str) -> bool {
        self.strategy_for(field_name).is_some()
    }

    /// Registered column names in first-registration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replace every registered strategy (all layers) with `wrap(name, s)`.
    pub fn decorate<F>(&mut self, mut wrap: F)
    where
        F: FnMut(&str, Arc<dyn MappingStrategy>) -> Arc<dyn MappingStrategy>,
    {
        for (name, layers) in self.fields.iter_mut() {
            for strategy in layers.values_mut() {
                *strategy = wrap(name, Arc::clone(strategy));
            }
        }
    }

    /// Map `lsi_headers` for one book. The result has exactly one entry per
    /// header; unmapped or failed columns are empty.
    pub async fn apply_mappings(&self, metadata: &CodexMetadata, lsi_headers: &[String]) -> IndexMap<String, String> {
        self.apply_mappings_with_report(metadata, lsi_headers).await.values
    }

    /// [`Self::apply_mappings`] as a positional row for CSV output.
    pub async fn apply_mappings_ordered(&self, metadata: &CodexMetadata, lsi_headers: &[String]) -> Vec<String> {
        let values = self.apply_mappings(metadata, lsi_headers).await;
        lsi_headers
            .iter()
            .map(|h| values.get(h).cloned().unwrap_or_default())
            .collect()
    }

    /// Map `lsi_headers` and report which columns failed, which had no
    /// strategy, and which were skipped by `validate_input`.
    pub async fn apply_mappings_with_report(&self, metadata: &CodexMetadata, lsi_headers: &[String]) -> MappedRow {
        let mut row: IndexMap<String, String> = IndexMap::with_capacity(lsi_headers.len());
        let mut report = RowReport::for_book(metadata);

        let context = self.configuration.as_ref().map(|(configuration, base)| {
            let mut ctx = base.clone();
            if ctx.book_isbn.is_none() && !metadata.isbn13.trim().is_empty() {
                ctx.book_isbn = Some(metadata.isbn13.trim().to_string());
            }
            (Arc::clone(configuration), ctx)
        });

        for header in lsi_headers {
            if row.contains_key(header) {
                continue;
            }
            let Some(strategy) = self.strategy_for(header) else {
                report.unmapped.push(header.clone());
                row.insert(header.clone(), String::new());
                continue;
            };

            let value = {
                let ctx = MappingContext {
                    field_name: header,
                    lsi_headers,
                    current_row_data: &row,
                    config: &self.config,
                    configuration: context.as_ref().map(|(c, ctx)| (c.as_ref(), ctx)),
                };

                if !strategy.validate_input(metadata, &ctx) {
                    debug!("Input rejected for '{}'", header);
                    report.skipped.push(header.clone());
                    String::new()
                } else {
                    match strategy.map_field(metadata, &ctx).await {
                        Ok(value) => value,
                        Err(e) => {
                            warn!("Mapping failed for '{}' (book {}): {}", header, metadata.shortuuid, e);
                            report.failures.push(FieldFailure {
                                field: header.clone(),
                                error: e,
                            });
                            String::new()
                        }
                    }
                }
            };

            if value.is_empty() {
                report.empty.push(header.clone());
            }
            row.insert(header.clone(), value);
        }

        MappedRow { values: row, report }
    }
}
