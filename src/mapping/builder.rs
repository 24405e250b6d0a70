//! Registries covering the full LSI header set.

use super::basic::{ComputedMappingStrategy, ConditionalMappingStrategy, DefaultMappingStrategy, DirectMappingStrategy};
use super::contributors::ContributorRoleStrategy;
use super::dates::{DateComputationStrategy, DateKind};
use super::descriptions::{AnnotationStrategy, KeywordsStrategy, RenditionBooktypeStrategy, ShortDescriptionStrategy};
use super::llm::LLMCompletionStrategy;
use super::paths::{FileKind, FilePathStrategy};
use super::physical::{trim_dimensions, PhysicalSpec, PhysicalSpecsStrategy};
use super::pricing::{DiscountStrategy, MarketPricingStrategy, PriceCache, TerritorialPricingStrategy, USPricingStrategy};
use super::subjects::{BisacCategoryStrategy, ThemaSubjectStrategy};
use super::tranche::{wrap_registry_with_tranche_overrides, TrancheAwareSeriesStrategy, TrancheOverrideManager, TrancheOverrideStrategy};
use super::{FieldMappingRegistry, MappingContext, MappingStrategy, StrategyLayer};
use crate::completion::FieldCompleter;
use crate::config::{ConfigurationContext, MultiLevelConfiguration};
use crate::error::MappingError;
use crate::lsi_headers::{discount_header, price_header, CONVERTED_TERRITORIES, USD_MARKET_TERRITORIES};
use crate::metadata::{CodexMetadata, MetadataField as F};
use crate::validation::isbn::canonical_isbn13;
use crate::validation::text::ANNOTATION_MAX_CHARS;
use crate::validation::SubjectServices;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Inputs for registry construction.
#[derive(Clone)]
pub struct RegistryOptions {
    pub services: Arc<SubjectServices>,
    pub completer: Option<Arc<dyn FieldCompleter>>,
    pub tranche_overrides: Option<Arc<TrancheOverrideManager>>,
    pub config: Map<String, Value>,
    pub configuration: Option<(Arc<MultiLevelConfiguration>, ConfigurationContext)>,
    pub paper_type: String,
    pub default_discount_percent: f64,
    /// Days from today for books without a publication date.
    pub publication_lead_days: i64,
    /// Street date relative to the publication date.
    pub street_date_offset_days: i64,
    pub today: Option<NaiveDate>,
}

impl RegistryOptions {
    pub fn new(services: Arc<SubjectServices>) -> Self {
        Self {
            services,
            completer: None,
            tranche_overrides: None,
            config: Map::new(),
            configuration: None,
            paper_type: "standard".to_string(),
            default_discount_percent: 40.0,
            publication_lead_days: 90,
            street_date_offset_days: 0,
            today: None,
        }
    }

    pub fn with_completer(mut self, completer: Option<Arc<dyn FieldCompleter>>) -> Self {
        self.completer = completer;
        self
    }

    pub fn with_tranche_overrides(mut self, manager: Arc<TrancheOverrideManager>) -> Self {
        self.tranche_overrides = Some(manager);
        self
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_configuration(mut self, configuration: Arc<MultiLevelConfiguration>, context: ConfigurationContext) -> Self {
        self.configuration = Some((configuration, context));
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn date(&self, kind: DateKind) -> DateComputationStrategy {
        let strategy = DateComputationStrategy::new(kind)
            .with_lead_days(self.publication_lead_days)
            .with_offset_days(self.street_date_offset_days);
        match self.today {
            Some(today) => strategy.with_today(today),
            None => strategy,
        }
    }
}

/// ISO 639-2/B code for a language name or code.
pub fn language_code(raw: &str) -> Option<String> {
    const NAMES: &[(&str, &str)] = &[
        ("english", "eng"),
        ("en", "eng"),
        ("french", "fre"),
        ("fr", "fre"),
        ("german", "ger"),
        ("de", "ger"),
        ("spanish", "spa"),
        ("es", "spa"),
        ("italian", "ita"),
        ("it", "ita"),
        ("portuguese", "por"),
        ("pt", "por"),
        ("japanese", "jpn"),
        ("ja", "jpn"),
        ("korean", "kor"),
        ("ko", "kor"),
        ("chinese", "chi"),
        ("zh", "chi"),
        ("latin", "lat"),
        ("la", "lat"),
        ("russian", "rus"),
        ("ru", "rus"),
    ];
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if let Some((_, code)) = NAMES.iter().find(|(name, _)| *name == lower) {
        return Some(code.to_string());
    }
    (lower.len() == 3 && lower.chars().all(|c| c.is_ascii_lowercase())).then_some(lower)
}

fn format_inches(value: f64) -> String {
    let text = format!("{:.3}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn has_value(field: F) -> impl Fn(&CodexMetadata, &MappingContext<'_>) -> bool + Send + Sync + 'static {
    move |metadata: &CodexMetadata, _: &MappingContext<'_>| !metadata.get(field).trim().is_empty()
}

fn direct(field: F) -> DirectMappingStrategy {
    DirectMappingStrategy::new(field)
}

/// Base-layer registry for every LSI column.
pub fn create_comprehensive_lsi_registry(options: &RegistryOptions) -> FieldMappingRegistry {
    let services = &options.services;
    let mut registry = FieldMappingRegistry::new().with_config(options.config.clone());
    if let Some((configuration, context)) = &options.configuration {
        registry = registry.with_configuration(Arc::clone(configuration), context.clone());
    }

    // account and submission
    registry.register_strategy("Lightning Source Account #", TrancheOverrideStrategy::new("lightning_source_account"));
    registry.register_strategy("Metadata Contact Dictionary", TrancheOverrideStrategy::new("metadata_contact_dictionary"));
    registry.register_strategy(
        "Cover/Jacket Submission Method",
        direct(F::CoverSubmissionMethod).or_config("cover_submission_method").with_default("FTP"),
    );
    registry.register_strategy(
        "Text Block SubmissionMethod",
        direct(F::TextBlockSubmissionMethod).or_config("text_block_submission_method").with_default("FTP"),
    );

    // identity
    registry.register_strategy("Parent ISBN", direct(F::ParentIsbn));
    registry.register_strategy(
        "ISBN or SKU",
        ComputedMappingStrategy::from_metadata(|m| {
            canonical_isbn13(&m.isbn13, &m.isbn10).unwrap_or_else(|| m.isbn13.trim().to_string())
        }),
    );
    registry.register_strategy("Rendition /Booktype", RenditionBooktypeStrategy::new(Arc::clone(services)));
    registry.register_strategy("Title", direct(F::Title));
    registry.register_strategy("Publisher", direct(F::Publisher).or_config("publisher"));
    registry.register_strategy("Imprint", direct(F::Imprint).or_config("imprint"));
    registry.register_strategy("Edition Number", direct(F::EditionNumber).or_config("edition_number"));
    registry.register_strategy("Edition Description", direct(F::EditionDescription));
    registry.register_strategy("Publisher Reference ID", direct(F::PublisherReferenceId).or_field(F::ShortUuid));
    registry.register_strategy("Marketing Image", direct(F::MarketingImage));

    // contributors
    registry.register_strategy("Contributor One", direct(F::ContributorOne).or_field(F::Author));
    registry.register_strategy("Contributor Two", direct(F::ContributorTwo));
    registry.register_strategy("Contributor Three", direct(F::ContributorThree));
    for (slot, header) in [(1, "Contributor One Role"), (2, "Contributor Two Role"), (3, "Contributor Three Role")] {
        if let Some(strategy) = ContributorRoleStrategy::for_slot(slot, Arc::clone(services)) {
            registry.register_strategy(header, strategy);
        }
    }
    for (header, field) in [
        ("Contributor One BIO", F::ContributorOneBio),
        ("Contributor One Affiliations", F::ContributorOneAffiliations),
        ("Contributor One Professional Position", F::ContributorOneProfessionalPosition),
        ("Contributor One Location", F::ContributorOneLocation),
        ("Contributor One Location Type Code", F::ContributorOneLocationTypeCode),
        ("Contributor One Prior Work", F::ContributorOnePriorWork),
    ] {
        registry.register_strategy(header, direct(field));
    }

    // reserved columns stay empty
    for header in [
        "Reserved 1", "Reserved 2", "Reserved 3", "Reserved 4", "Reserved 5", "Reserved 6", "Reserved 7",
        "Reserved 8", "Reserved 9", "Reserved 10", "Reserved 11", "Reserved 12",
    ] {
        registry.register_strategy(header, DefaultMappingStrategy::blank());
    }
    registry.register_strategy("Reserved (Special Instructions)", direct(F::SpecialInstructions));

    // physical
    registry.register_strategy(
        "Custom Trim Width (inches)",
        ComputedMappingStrategy::from_metadata(|m| format_inches(trim_dimensions(m).0)),
    );
    registry.register_strategy(
        "Custom Trim Height (inches)",
        ComputedMappingStrategy::from_metadata(|m| format_inches(trim_dimensions(m).1)),
    );
    for (header, field, spec) in [
        ("Weight(Lbs)", F::WeightLbs, PhysicalSpec::Weight),
        ("Spine Width (inches)", F::SpineWidth, PhysicalSpec::SpineWidth),
    ] {
        match PhysicalSpecsStrategy::new(spec, &options.paper_type) {
            Ok(computed) => registry.register_strategy(
                header,
                ConditionalMappingStrategy::new(has_value(field), Arc::new(direct(field)), Arc::new(computed)),
            ),
            Err(e) => warn!("{}: {}", header, e),
        }
    }
    registry.register_strategy("Interior Color", direct(F::InteriorColor).or_config("interior_color"));
    registry.register_strategy("Paper Type", direct(F::PaperType).or_config("paper_type"));
    registry.register_strategy("Cover Type", direct(F::CoverType).or_config("cover_type"));
    registry.register_strategy("Lamination", direct(F::Lamination).or_config("lamination"));
    registry.register_strategy("Carton Pack Quantity", direct(F::CartonPackQuantity).or_config("carton_pack_quantity"));

    // dates
    registry.register_strategy("Pub Date", options.date(DateKind::Publication));
    registry.register_strategy("Street Date", options.date(DateKind::Street));
    registry.register_strategy("Copyright Year", options.date(DateKind::CopyrightYear));

    // rights and distribution
    registry.register_strategy(
        "Territorial Rights",
        direct(F::TerritorialRights).or_config("territorial_rights").with_default("World"),
    );
    registry.register_strategy("LSI Special Category", direct(F::LsiSpecialCategory).or_config("lsi_special_category"));
    registry.register_strategy("Order Type Eligibility", direct(F::OrderTypeEligibility).or_config("order_type_eligibility"));
    registry.register_strategy("Returnable", direct(F::Returnability).or_config("returnable"));
    for (header, field) in [
        ("Stamped Text LEFT", F::StampedTextLeft),
        ("Stamped Text CENTER", F::StampedTextCenter),
        ("Stamped Text RIGHT", F::StampedTextRight),
    ] {
        registry.register_strategy(header, direct(field));
    }
    for (i, field) in [F::LsiFlexfield1, F::LsiFlexfield2, F::LsiFlexfield3, F::LsiFlexfield4, F::LsiFlexfield5]
        .into_iter()
        .enumerate()
    {
        registry.register_strategy(
            format!("LSI FlexField{}", i + 1),
            direct(field).or_config(format!("lsi_flexfield{}", i + 1)),
        );
    }

    // files
    registry.register_strategy("Interior Path / Filename", FilePathStrategy::new(FileKind::Interior));
    registry.register_strategy("Cover Path / Filename", FilePathStrategy::new(FileKind::Cover));
    registry.register_strategy("Jacket Path / Filename", FilePathStrategy::new(FileKind::Jacket));

    // descriptive
    registry.register_strategy("Annotation / Summary", AnnotationStrategy::new(None));
    registry.register_strategy("Short Description", ShortDescriptionStrategy::default());
    registry.register_strategy("Keywords", KeywordsStrategy);
    registry.register_strategy(
        "Language Code",
        ComputedMappingStrategy::new(|m: &CodexMetadata, ctx: &MappingContext<'_>| {
            language_code(&m.language)
                .or_else(|| ctx.lookup_str("language_code").and_then(|c| language_code(&c)))
                .map(Ok)
                .unwrap_or_else(|| match m.language.trim() {
                    "" => Ok("eng".to_string()),
                    other => Err(format!("unknown language '{}'", other)),
                })
        }),
    );
    for (header, field) in [
        ("Table of Contents", F::TableOfContents),
        ("Review Quote(s)", F::ReviewQuotes),
        ("# Illustrations", F::IllustrationCount),
        ("Illustration Notes", F::IllustrationNotes),
        ("Regional Subjects", F::RegionalSubjects),
        ("Audience", F::Audience),
        ("Min Age", F::MinAge),
        ("Max Age", F::MaxAge),
        ("Min Grade", F::MinGrade),
        ("Max Grade", F::MaxGrade),
        ("Series Name", F::SeriesName),
        ("# in Series", F::SeriesNumber),
    ] {
        registry.register_strategy(header, direct(field));
    }

    // subjects
    for (i, header) in ["BISAC Category", "BISAC Category 2", "BISAC Category 3"].into_iter().enumerate() {
        registry.register_strategy(header, BisacCategoryStrategy::new(i, Arc::clone(services)));
    }
    for (i, header) in ["Thema Subject 1", "Thema Subject 2", "Thema Subject 3"].into_iter().enumerate() {
        registry.register_strategy(header, ThemaSubjectStrategy::new(i, Arc::clone(services)));
    }

    register_pricing(&mut registry, options);

    info!("Comprehensive LSI registry: {} columns", registry.len());
    registry
}

fn register_pricing(registry: &mut FieldMappingRegistry, options: &RegistryOptions) {
    let cache = PriceCache::new();
    let discount = options.default_discount_percent;

    registry.register_strategy(price_header("US"), USPricingStrategy);
    registry.register_strategy(discount_header("US"), DiscountStrategy::new("US", discount));

    for &territory in CONVERTED_TERRITORIES {
        match TerritorialPricingStrategy::for_territory(territory, Arc::clone(&cache)) {
            Ok(strategy) => registry.register_strategy(price_header(territory), strategy),
            Err(e) => warn!("{}", e),
        }
        registry.register_strategy(discount_header(territory), DiscountStrategy::new(territory, discount));
    }
    for &market in USD_MARKET_TERRITORIES {
        registry.register_strategy(price_header(market), MarketPricingStrategy::new(market));
        registry.register_strategy(discount_header(market), DiscountStrategy::new(market, discount));
    }
}

/// The comprehensive registry plus LLM completion (enhanced layer),
/// tranche-aware series handling, and tranche overrides when configured.
pub fn create_enhanced_field_mapping_registry(options: &RegistryOptions) -> FieldMappingRegistry {
    let mut registry = create_comprehensive_lsi_registry(options);
    let completer = options.completer.clone();

    let llm = |field: &str| -> LLMCompletionStrategy {
        LLMCompletionStrategy::new(field).with_completer(completer.clone())
    };
    let enhanced: Vec<(&str, LLMCompletionStrategy)> = vec![
        ("Contributor One BIO", llm("contributor_one_bio").with_max_length(1000)),
        ("Contributor One Affiliations", llm("contributor_one_affiliations")),
        ("Contributor One Professional Position", llm("contributor_one_professional_position")),
        ("Contributor One Location", llm("contributor_one_location")),
        ("Table of Contents", llm("table_of_contents")),
        ("Audience", llm("audience")),
        ("Min Age", llm("min_age")),
        ("Max Age", llm("max_age")),
        ("Illustration Notes", llm("illustration_notes")),
    ];
    for (header, strategy) in enhanced {
        registry.register_layered(StrategyLayer::Enhanced, header, Arc::new(strategy));
    }
    registry.register_layered(
        StrategyLayer::Enhanced,
        "Annotation / Summary",
        Arc::new(AnnotationStrategy::new(Some(
            llm("annotation").with_prompt_key("annotation").with_max_length(ANNOTATION_MAX_CHARS),
        ))),
    );

    registry.register_layered(StrategyLayer::TrancheAware, "Series Name", Arc::new(TrancheAwareSeriesStrategy::name()));
    registry.register_layered(StrategyLayer::TrancheAware, "# in Series", Arc::new(TrancheAwareSeriesStrategy::number()));

    if let Some(manager) = &options.tranche_overrides {
        wrap_registry_with_tranche_overrides(&mut registry, Arc::clone(manager));
    }
    registry
}

/// Strategy lookup by name for configuration-driven field mappings
/// (`"direct:title"`, `"default:World"`, `"config:lightning_source_account"`,
/// `"llm:contributor_one_bio"`, `"physical:thickness"`).
pub fn strategy_from_spec(spec: &str, options: &RegistryOptions) -> Result<Arc<dyn MappingStrategy>, MappingError> {
    let (kind, arg) = spec.split_once(':').unwrap_or((spec, ""));
    let strategy: Arc<dyn MappingStrategy> = match kind.trim() {
        "direct" => Arc::new(DirectMappingStrategy::named(arg.trim())?),
        "default" => Arc::new(DefaultMappingStrategy::new(arg)),
        "blank" => Arc::new(DefaultMappingStrategy::blank()),
        "config" => Arc::new(TrancheOverrideStrategy::new(arg.trim())),
        "llm" => Arc::new(LLMCompletionStrategy::new(arg.trim()).with_completer(options.completer.clone())),
        "physical" => Arc::new(PhysicalSpecsStrategy::new(arg.parse::<PhysicalSpec>()?, &options.paper_type)?),
        other => return Err(MappingError::Misconfigured(format!("unknown strategy kind '{}'", other))),
    };
    Ok(strategy)
}

/// Register configuration-driven mappings (`header -> strategy spec`) at the
/// tranche-aware layer. Returns the headers whose spec was rejected.
pub fn apply_field_mappings(
    registry: &mut FieldMappingRegistry,
    mappings: &Map<String, Value>,
    options: &RegistryOptions,
) -> Vec<String> {
    let mut rejected = Vec::new();
    for (header, spec) in mappings {
        let Some(spec) = spec.as_str() else {
            rejected.push(header.clone());
            continue;
        };
        match strategy_from_spec(spec, options) {
            Ok(strategy) => registry.register_layered(StrategyLayer::TrancheAware, header.clone(), strategy),
            Err(e) => {
                warn!("Field mapping for '{}' rejected: {}", header, e);
                rejected.push(header.clone());
            }
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsi_headers::lsi_headers;
    use crate::mapping::llm::tests::FixedCompleter;
    use serde_json::json;

    fn options() -> RegistryOptions {
        RegistryOptions::new(Arc::new(SubjectServices::default()))
            .with_today(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }

    fn sample_book() -> CodexMetadata {
        let mut m = CodexMetadata::new("Tide Tables", "R. Moss");
        m.isbn13 = "978-0-306-40615-7".into();
        m.publisher = "Nimble Books LLC".into();
        m.imprint = "Xynapse Traces".into();
        m.page_count = 300;
        m.list_price_usd = 20.0;
        m.publication_date = "2025-06-01".into();
        m.bisac_codes = "SCI034000".into();
        m.summary_long = "A history of tides and the people who measured them.".into();
        m.language = "English".into();
        m
    }

    #[test]
    fn test_every_lsi_header_is_registered() {
        let registry = create_comprehensive_lsi_registry(&options());
        for header in lsi_headers() {
            assert!(registry.has_strategy(&header), "missing strategy for {}", header);
        }
    }

    #[tokio::test]
    async fn test_full_row_for_sample_book() {
        let registry = create_enhanced_field_mapping_registry(&options());
        let headers = lsi_headers();
        let mapped = registry.apply_mappings_with_report(&sample_book(), &headers).await;

        assert_eq!(mapped.values.len(), headers.len());
        assert!(mapped.report.failures.is_empty(), "{:?}", mapped.report.failures);
        let v = &mapped.values;
        assert_eq!(v["ISBN or SKU"], "9780306406157");
        assert_eq!(v["Contributor One"], "R. Moss");
        assert_eq!(v["Contributor One Role"], "A");
        assert_eq!(v["Rendition /Booktype"], "Perfect Bound");
        assert_eq!(v["Spine Width (inches)"], "0.62\"");
        assert_eq!(v["Custom Trim Width (inches)"], "6");
        assert_eq!(v["Pub Date"], "2025-06-01");
        assert_eq!(v["Copyright Year"], "2025");
        assert_eq!(v["Language Code"], "eng");
        assert_eq!(v["BISAC Category"], "SCIENCE / History");
        assert_eq!(v["US Suggested List Price"], "$20.00");
        assert_eq!(v["CA Suggested List Price (mode 2)"], "$27.00");
        assert_eq!(v["USBR1 Suggested List Price (mode 2)"], "$20.00");
        assert_eq!(v["US Wholesale Discount"], "40");
        assert_eq!(v["Interior Path / Filename"], "9780306406157_interior.pdf");
        assert_eq!(v["Annotation / Summary"], "<p>A history of tides and the people who measured them.</p>");
        assert_eq!(v["Reserved 1"], "");
    }

    #[tokio::test]
    async fn test_enhanced_layer_uses_completer() {
        let opts = options().with_completer(Some(Arc::new(FixedCompleter::new(Some("Writes about the sea.")))));
        let registry = create_enhanced_field_mapping_registry(&opts);
        assert_eq!(registry.winning_layer("Contributor One BIO"), Some(StrategyLayer::Enhanced));
        let row = registry
            .apply_mappings(&sample_book(), &["Contributor One BIO".to_string()])
            .await;
        assert_eq!(row["Contributor One BIO"], "Writes about the sea.");
    }

    #[tokio::test]
    async fn test_tranche_override_round_trip() {
        let opts = options().with_tranche_overrides(Arc::new(TrancheOverrideManager::new().with_override("Series Name", "X")));
        let registry = create_enhanced_field_mapping_registry(&opts);
        let mut book = sample_book();
        book.series_name = "Own".into();
        let row = registry.apply_mappings(&book, &["Series Name".to_string()]).await;
        assert_eq!(row["Series Name"], "X");
    }

    #[tokio::test]
    async fn test_configured_field_mappings() {
        let opts = options();
        let mut registry = create_comprehensive_lsi_registry(&opts);
        let mappings = json!({
            "LSI FlexField1": "default:Imprint Edition",
            "Edition Description": "direct:subtitle",
            "LSI FlexField2": "bogus:thing",
            "LSI FlexField3": "physical:thickness",
            "LSI FlexField4": "physical:heft",
        });
        let rejected = apply_field_mappings(&mut registry, mappings.as_object().unwrap(), &opts);
        assert_eq!(rejected, vec!["LSI FlexField2".to_string(), "LSI FlexField4".to_string()]);

        let mut book = sample_book();
        book.subtitle = "Sub".into();
        let headers = ["LSI FlexField1", "Edition Description", "LSI FlexField3"].map(String::from);
        let row = registry.apply_mappings(&book, &headers).await;
        assert_eq!(row["LSI FlexField1"], "Imprint Edition");
        assert_eq!(row["Edition Description"], "Sub");
        // 300 standard pages, paperback boards
        assert_eq!(row["LSI FlexField3"], "0.64\"");
    }

    #[test]
    fn test_language_code() {
        assert_eq!(language_code("English").as_deref(), Some("eng"));
        assert_eq!(language_code("fr").as_deref(), Some("fre"));
        assert_eq!(language_code("kor").as_deref(), Some("kor"));
        assert_eq!(language_code("Klingon"), None);
        assert_eq!(format_inches(5.5), "5.5");
        assert_eq!(format_inches(6.0), "6");
    }
}
