//! Per-book metadata record.
//!
//! `CodexMetadata` is the single source of truth for one book. Every field is
//! addressable through [`MetadataField`], so strategies name the field they read
//! at construction time instead of looking it up by free-form string.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

/// Conversion between a stored field value and its string form.
trait FieldValue {
    fn render(&self) -> String;
    fn assign(&mut self, raw: &str) -> bool;
}

impl FieldValue for String {
    fn render(&self) -> String {
        self.clone()
    }

    fn assign(&mut self, raw: &str) -> bool {
        *self = raw.trim().to_string();
        true
    }
}

impl FieldValue for u32 {
    fn render(&self) -> String {
        if *self == 0 {
            String::new()
        } else {
            self.to_string()
        }
    }

    fn assign(&mut self, raw: &str) -> bool {
        // "312 pages" and "312" are both accepted
        let digits: String = raw
            .trim()
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        match digits.parse() {
            Ok(n) => {
                *self = n;
                true
            }
            Err(_) => false,
        }
    }
}

impl FieldValue for f64 {
    fn render(&self) -> String {
        if *self == 0.0 {
            String::new()
        } else {
            format!("{:.2}", self)
        }
    }

    fn assign(&mut self, raw: &str) -> bool {
        match parse_price(raw) {
            Some(v) => {
                *self = v;
                true
            }
            None => false,
        }
    }
}

/// Parse a price such as `"$20.00"`, `"20"`, `"USD 19.99"` or `"12,50"`.
///
/// A single comma followed by at most two digits is a decimal separator;
/// other commas group thousands. Negative amounts are rejected.
pub fn parse_price(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let is_numeric = |c: char| c.is_ascii_digit() || c == '.' || c == ',';
    let start = raw.find(is_numeric)?;
    if raw[..start].trim_end().ends_with('-') {
        return None;
    }
    let number: String = raw[start..].chars().take_while(|c| is_numeric(*c)).collect();
    let decimal_comma = !number.contains('.')
        && number.matches(',').count() == 1
        && number.rsplit(',').next().is_some_and(|tail| tail.len() <= 2);
    let number = if decimal_comma {
        number.replace(',', ".")
    } else {
        number.replace(',', "")
    };
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

macro_rules! codex_metadata {
    ( $( $field:ident : $ty:ty => $variant:ident ),* $(,)? ) => {
        /// One book's bibliographic and distribution metadata.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct CodexMetadata {
            $( pub $field: $ty, )*
            /// Raw LLM responses keyed by prompt name.
            pub raw_llm_responses: BTreeMap<String, Value>,
            /// Parsed LLM completions keyed by prompt name.
            pub llm_completions: BTreeMap<String, Value>,
        }

        /// Typed handle for every scalar field of [`CodexMetadata`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum MetadataField {
            $( $variant, )*
        }

        impl MetadataField {
            pub const ALL: &'static [MetadataField] = &[ $( MetadataField::$variant, )* ];

            /// Snake-case name of the field as it appears in JSON.
            pub fn name(self) -> &'static str {
                match self {
                    $( MetadataField::$variant => stringify!($field), )*
                }
            }
        }

        impl CodexMetadata {
            /// Read a field as a string. Zero-valued numbers read as empty.
            pub fn get(&self, field: MetadataField) -> String {
                match field {
                    $( MetadataField::$variant => FieldValue::render(&self.$field), )*
                }
            }

            /// Assign a field from its string form. Returns false when the
            /// value cannot be parsed for a numeric field.
            pub fn set(&mut self, field: MetadataField, raw: &str) -> bool {
                match field {
                    $( MetadataField::$variant => FieldValue::assign(&mut self.$field, raw), )*
                }
            }
        }
    };
}

codex_metadata! {
    uuid: String => Uuid,
    shortuuid: String => ShortUuid,
    title: String => Title,
    subtitle: String => Subtitle,
    author: String => Author,
    publisher: String => Publisher,
    imprint: String => Imprint,
    isbn13: String => Isbn13,
    isbn10: String => Isbn10,
    parent_isbn: String => ParentIsbn,
    publication_date: String => PublicationDate,
    street_date: String => StreetDate,
    copyright_year: String => CopyrightYear,
    language: String => Language,
    edition_number: String => EditionNumber,
    edition_description: String => EditionDescription,
    series_name: String => SeriesName,
    series_number: String => SeriesNumber,
    page_count: u32 => PageCount,
    trim_size: String => TrimSize,
    trim_width: String => TrimWidth,
    trim_height: String => TrimHeight,
    binding: String => Binding,
    rendition_booktype: String => RenditionBooktype,
    interior_color: String => InteriorColor,
    paper_type: String => PaperType,
    cover_type: String => CoverType,
    lamination: String => Lamination,
    weight_lbs: String => WeightLbs,
    spine_width: String => SpineWidth,
    summary_short: String => SummaryShort,
    summary_long: String => SummaryLong,
    annotation: String => Annotation,
    keywords: String => Keywords,
    bisac_codes: String => BisacCodes,
    bisac_category_1: String => BisacCategory1,
    bisac_category_2: String => BisacCategory2,
    bisac_category_3: String => BisacCategory3,
    thema_subject_1: String => ThemaSubject1,
    thema_subject_2: String => ThemaSubject2,
    thema_subject_3: String => ThemaSubject3,
    regional_subjects: String => RegionalSubjects,
    audience: String => Audience,
    min_age: String => MinAge,
    max_age: String => MaxAge,
    min_grade: String => MinGrade,
    max_grade: String => MaxGrade,
    table_of_contents: String => TableOfContents,
    review_quotes: String => ReviewQuotes,
    illustration_count: String => IllustrationCount,
    illustration_notes: String => IllustrationNotes,
    contributor_one: String => ContributorOne,
    contributor_one_role: String => ContributorOneRole,
    contributor_one_bio: String => ContributorOneBio,
    contributor_one_affiliations: String => ContributorOneAffiliations,
    contributor_one_professional_position: String => ContributorOneProfessionalPosition,
    contributor_one_location: String => ContributorOneLocation,
    contributor_one_location_type_code: String => ContributorOneLocationTypeCode,
    contributor_one_prior_work: String => ContributorOnePriorWork,
    contributor_two: String => ContributorTwo,
    contributor_two_role: String => ContributorTwoRole,
    contributor_two_bio: String => ContributorTwoBio,
    contributor_three: String => ContributorThree,
    contributor_three_role: String => ContributorThreeRole,
    contributor_three_bio: String => ContributorThreeBio,
    territorial_rights: String => TerritorialRights,
    returnability: String => Returnability,
    order_type_eligibility: String => OrderTypeEligibility,
    lsi_account: String => LsiAccount,
    metadata_contact: String => MetadataContact,
    lsi_special_category: String => LsiSpecialCategory,
    lsi_flexfield1: String => LsiFlexfield1,
    lsi_flexfield2: String => LsiFlexfield2,
    lsi_flexfield3: String => LsiFlexfield3,
    lsi_flexfield4: String => LsiFlexfield4,
    lsi_flexfield5: String => LsiFlexfield5,
    stamped_text_left: String => StampedTextLeft,
    stamped_text_center: String => StampedTextCenter,
    stamped_text_right: String => StampedTextRight,
    publisher_reference_id: String => PublisherReferenceId,
    carton_pack_quantity: String => CartonPackQuantity,
    marketing_image: String => MarketingImage,
    interior_path: String => InteriorPath,
    cover_path: String => CoverPath,
    jacket_path: String => JacketPath,
    cover_submission_method: String => CoverSubmissionMethod,
    text_block_submission_method: String => TextBlockSubmissionMethod,
    special_instructions: String => SpecialInstructions,
    list_price_usd: f64 => ListPriceUsd,
    us_wholesale_discount: String => UsWholesaleDiscount,
    uk_list_price: String => UkListPrice,
    uk_wholesale_discount: String => UkWholesaleDiscount,
    eu_list_price: String => EuListPrice,
    eu_wholesale_discount: String => EuWholesaleDiscount,
    au_list_price: String => AuListPrice,
    au_wholesale_discount: String => AuWholesaleDiscount,
    ca_list_price: String => CaListPrice,
    ca_wholesale_discount: String => CaWholesaleDiscount,
    mood: String => Mood,
    tranche: String => Tranche,
}

/// Alternate spellings seen in LLM output and operator-facing labels.
const FIELD_ALIASES: &[(&str, MetadataField)] = &[
    ("isbn", MetadataField::Isbn13),
    ("isbn_13", MetadataField::Isbn13),
    ("isbn_or_sku", MetadataField::Isbn13),
    ("isbn_10", MetadataField::Isbn10),
    ("pages", MetadataField::PageCount),
    ("page_count_estimate", MetadataField::PageCount),
    ("list_price", MetadataField::ListPriceUsd),
    ("price", MetadataField::ListPriceUsd),
    ("us_list_price", MetadataField::ListPriceUsd),
    ("us_suggested_list_price", MetadataField::ListPriceUsd),
    ("summary", MetadataField::SummaryLong),
    ("description", MetadataField::SummaryLong),
    ("long_description", MetadataField::SummaryLong),
    ("short_description", MetadataField::SummaryShort),
    ("pub_date", MetadataField::PublicationDate),
    ("bisac", MetadataField::BisacCodes),
    ("bisac_category", MetadataField::BisacCategory1),
    ("bisac_subjects", MetadataField::BisacCodes),
    ("thema", MetadataField::ThemaSubject1),
    ("thema_subjects", MetadataField::ThemaSubject1),
    ("toc", MetadataField::TableOfContents),
    ("reviews", MetadataField::ReviewQuotes),
    ("language_code", MetadataField::Language),
    ("contributor_one_biography", MetadataField::ContributorOneBio),
    ("author_bio", MetadataField::ContributorOneBio),
    ("number_in_series", MetadataField::SeriesNumber),
    ("in_series", MetadataField::SeriesNumber),
    ("series", MetadataField::SeriesName),
    ("lightning_source_account", MetadataField::LsiAccount),
    ("returnable", MetadataField::Returnability),
    ("metadata_contact_dictionary", MetadataField::MetadataContact),
    ("cover_jacket_submission_method", MetadataField::CoverSubmissionMethod),
];

/// Normalize a free-form key to snake case: lower-case, punctuation and
/// whitespace collapsed to single underscores.
pub fn normalize_key(key: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    re.replace_all(&key.trim().to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Error for field names that do not name a metadata field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metadata field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for MetadataField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s);
        MetadataField::ALL
            .iter()
            .copied()
            .find(|f| f.name() == key)
            .or_else(|| {
                FIELD_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == key)
                    .map(|(_, f)| *f)
            })
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of [`CodexMetadata::update_from_dict`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateSummary {
    pub updated: Vec<MetadataField>,
    pub unknown: Vec<String>,
}

impl CodexMetadata {
    /// Create a record for a new book, assigning its identity.
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let mut metadata = Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        };
        metadata.finalize();
        metadata
    }

    /// Deserialize a record and assign identity defaults.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let mut metadata: Self = serde_json::from_value(value)?;
        metadata.finalize();
        Ok(metadata)
    }

    /// Fill construction-time defaults: uuid, shortuuid, contributor one.
    /// `shortuuid` is always re-derived from `uuid`.
    fn finalize(&mut self) {
        if self.uuid.trim().is_empty() {
            self.uuid = Uuid::new_v4().to_string();
        }
        self.shortuuid = self.uuid.chars().take(8).collect();
        if self.contributor_one.is_empty() && !self.author.is_empty() {
            self.contributor_one = self.author.clone();
        }
    }

    /// Merge a loosely keyed dictionary (usually parsed LLM output) into the
    /// record. Keys are normalized, list values are joined with `"; "`.
    pub fn update_from_dict(&mut self, data: &Map<String, Value>) -> UpdateSummary {
        let mut summary = UpdateSummary::default();

        for (key, value) in data {
            let normalized = normalize_key(key);

            if normalized == "llm_completions" || normalized == "raw_llm_responses" {
                if let Some(obj) = value.as_object() {
                    let target = if normalized == "llm_completions" {
                        &mut self.llm_completions
                    } else {
                        &mut self.raw_llm_responses
                    };
                    for (k, v) in obj {
                        target.insert(k.clone(), v.clone());
                    }
                }
                continue;
            }

            let field = match normalized.parse::<MetadataField>() {
                Ok(MetadataField::Uuid | MetadataField::ShortUuid) => {
                    debug!("update_from_dict: identity field '{}' is not updatable", key);
                    summary.unknown.push(key.clone());
                    continue;
                }
                Ok(field) => field,
                Err(_) => {
                    debug!("update_from_dict: ignoring unknown key '{}'", key);
                    summary.unknown.push(key.clone());
                    continue;
                }
            };

            let Some(text) = value_to_field_string(value) else {
                continue;
            };

            if self.set(field, &text) {
                summary.updated.push(field);
            } else {
                debug!("update_from_dict: could not parse '{}' for {}", text, field);
            }
        }

        summary
    }

    /// First non-empty value among `fields`.
    pub fn first_non_empty(&self, fields: &[MetadataField]) -> Option<String> {
        fields
            .iter()
            .map(|f| self.get(*f))
            .find(|v| !v.trim().is_empty())
    }
}

/// Flatten a JSON value into the string stored on a metadata field.
pub fn value_to_field_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(value_to_field_string)
                .filter(|s| !s.trim().is_empty())
                .collect();
            Some(parts.join("; "))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}
