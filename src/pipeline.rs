//! Book-to-LSI pipeline: resolve configuration, build the registry, map,
//! validate, and checkpoint.

use crate::checkpoint::CheckpointManager;
use crate::completion::{FieldCompleter, LlmFieldCompleter};
use crate::config::{value_as_text, ConfigurationContext, MultiLevelConfiguration};
use crate::loaders::ConfigHierarchy;
use crate::lsi_headers::lsi_headers;
use crate::mapping::builder::{apply_field_mappings, create_enhanced_field_mapping_registry, RegistryOptions};
use crate::mapping::physical::PaperStock;
use crate::mapping::tranche::wrap_registry_with_tranche_overrides;
use crate::mapping::{FieldMappingRegistry, MappedRow};
use crate::metadata::{normalize_key, CodexMetadata};
use crate::report::BatchReport;
use crate::settings::Settings;
use crate::validation::{validate_row, SubjectServices};
use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates mapping for one configuration root.
pub struct Pipeline {
    configuration: Arc<MultiLevelConfiguration>,
    hierarchy: ConfigHierarchy,
    services: Arc<SubjectServices>,
    completer: Option<Arc<dyn FieldCompleter>>,
    headers: Vec<String>,
}

impl Pipeline {
    pub fn new(
        configuration: Arc<MultiLevelConfiguration>,
        hierarchy: ConfigHierarchy,
        services: Arc<SubjectServices>,
        completer: Option<Arc<dyn FieldCompleter>>,
    ) -> Self {
        Self {
            configuration,
            hierarchy,
            services,
            completer,
            headers: lsi_headers(),
        }
    }

    /// Load configuration, entity managers and lookup tables from the
    /// directories named in `settings`. LLM completion is enabled only when an
    /// OpenRouter key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let configuration = Arc::new(MultiLevelConfiguration::new(&settings.config_dir));
        let hierarchy = ConfigHierarchy::load(&settings.config_dir)?;
        let services = Arc::new(SubjectServices::load(&settings.resources_dir));

        let completer: Option<Arc<dyn FieldCompleter>> = if settings.llm_enabled {
            match LlmFieldCompleter::from_env() {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    warn!("LLM completion disabled: {:#}", e);
                    None
                }
            }
        } else {
            info!("OPENROUTER_API_KEY not set, LLM completion disabled");
            None
        };
        Ok(Self::new(configuration, hierarchy, services, completer))
    }

    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn configuration(&self) -> &Arc<MultiLevelConfiguration> {
        &self.configuration
    }

    pub fn hierarchy(&self) -> &ConfigHierarchy {
        &self.hierarchy
    }

    pub fn services(&self) -> &Arc<SubjectServices> {
        &self.services
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Create and persist a publisher, imprint or tranche from a template.
    /// The configuration forgets any earlier miss for the new name so the
    /// next lookup reads the file.
    pub fn create_config(&self, kind: &str, template: &str, name: &str, overrides: Map<String, Value>) -> Result<Value> {
        let created = self.hierarchy.create_from_template(kind, template, name, overrides)?;
        if let Some(level) = ConfigHierarchy::level_of(kind) {
            self.configuration.invalidate_context(level, name);
        }
        Ok(created)
    }

    /// Context for one book: the caller's keys first, then the book's ISBN,
    /// tranche and imprint, then the owners the hierarchy knows about.
    pub fn context_for(&self, metadata: &CodexMetadata, base: ConfigurationContext) -> ConfigurationContext {
        let mut context = base;
        let fill = |slot: &mut Option<String>, value: String| {
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value);
            }
        };
        fill(&mut context.book_isbn, metadata.isbn13.chars().filter(char::is_ascii_digit).collect());
        if context.tranche_name.is_none() && !metadata.tranche.trim().is_empty() {
            let key = normalize_key(&metadata.tranche);
            context.tranche_name = Some(if self.hierarchy.tranches.get(&key).is_some() {
                key
            } else {
                metadata.tranche.trim().to_string()
            });
        }
        if context.imprint_name.is_none() && !metadata.imprint.trim().is_empty() {
            let key = normalize_key(&metadata.imprint);
            if self.hierarchy.imprints.get(&key).is_some() {
                context.imprint_name = Some(key);
            }
        }
        self.hierarchy.complete_context(context)
    }

    fn days(&self, key: &str, context: &ConfigurationContext, default: i64) -> i64 {
        match self.configuration.get_value(key, context, Value::Null) {
            Value::Number(n) => n.as_i64().unwrap_or(default),
            other => value_as_text(&other).and_then(|s| s.trim().parse().ok()).unwrap_or(default),
        }
    }

    /// Registry for `context`: enhanced strategies, then configured field
    /// mappings, then the tranche's override rules around everything.
    pub fn build_registry(&self, context: &ConfigurationContext) -> FieldMappingRegistry {
        let mut options = RegistryOptions::new(Arc::clone(&self.services))
            .with_completer(self.completer.clone())
            .with_configuration(Arc::clone(&self.configuration), context.clone());

        if let Some(paper) = self.configuration.get_string("paper_type", context) {
            if PaperStock::named(&paper).is_some() {
                options.paper_type = paper;
            } else {
                debug!("Paper type '{}' has no stock table, using {}", paper, options.paper_type);
            }
        }
        if let Some(discount) = self
            .configuration
            .get_string("wholesale_discount_percent", context)
            .and_then(|d| d.trim().trim_end_matches('%').parse::<f64>().ok())
        {
            options.default_discount_percent = discount;
        }
        options.publication_lead_days = self.days("publication_lead_days", context, options.publication_lead_days);
        options.street_date_offset_days = self.days("street_date_offset_days", context, options.street_date_offset_days);

        let mut registry = create_enhanced_field_mapping_registry(&options);

        let mappings = self.hierarchy.field_mappings(context);
        if !mappings.is_empty() {
            let rejected = apply_field_mappings(&mut registry, &mappings, &options);
            debug!("Applied {} field mappings ({} rejected)", mappings.len() - rejected.len(), rejected.len());
        }

        let overrides = context
            .tranche_name
            .as_deref()
            .and_then(|name| self.hierarchy.tranches.get(name))
            .and_then(|tranche| tranche.override_manager());
        if let Some(manager) = overrides {
            wrap_registry_with_tranche_overrides(&mut registry, Arc::new(manager));
        }
        registry
    }

    /// Map and validate one book without writing anything.
    pub async fn preview(&self, metadata: &CodexMetadata, context: ConfigurationContext) -> MappedRow {
        let context = self.context_for(metadata, context);
        let registry = self.build_registry(&context);
        let mut mapped = registry.apply_mappings_with_report(metadata, &self.headers).await;
        mapped.report.issues = validate_row(&mapped.values, &self.services);
        mapped
    }

    /// One book as a positional row in header order.
    pub async fn row(&self, metadata: &CodexMetadata, context: ConfigurationContext) -> Vec<String> {
        let context = self.context_for(metadata, context);
        self.build_registry(&context).apply_mappings_ordered(metadata, &self.headers).await
    }

    /// Map every book, appending rows to `checkpoint` when given. Books the
    /// checkpoint already holds are skipped.
    pub async fn run_batch(
        &self,
        books: &[CodexMetadata],
        context: ConfigurationContext,
        mut checkpoint: Option<&mut CheckpointManager>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::new(&self.headers);
        report.books_total = books.len();
        report.output_path = checkpoint.as_deref().map(|c| c.csv_path().display().to_string());
        info!("Starting batch of {} books", books.len());

        for book in books {
            if checkpoint.as_deref().is_some_and(|c| c.is_processed(book)) {
                debug!("Skipping '{}': already checkpointed", book.title);
                report.record_resumed();
                continue;
            }

            let mapped = self.preview(book, context.clone()).await;
            if mapped.report.has_errors() {
                warn!(
                    "'{}': {} failed fields, {} validation issues",
                    book.title,
                    mapped.report.failures.len(),
                    mapped.report.issues.len()
                );
            }
            if let Some(checkpoint) = checkpoint.as_deref_mut() {
                checkpoint.append_row(book, &mapped.values)?;
            }
            report.record(&mapped.values, mapped.report);
        }

        report.finish();
        info!(
            "Batch done: {} mapped, {} resumed, {} with errors",
            report.books_mapped,
            report.books_resumed,
            report.rows_with_errors()
        );
        Ok(report)
    }
}
