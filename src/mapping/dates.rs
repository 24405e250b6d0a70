//! Publication, street and copyright dates.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::CodexMetadata;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// Parse the date spellings found in metadata and configuration. Accepts
/// RFC 3339 timestamps, `YYYY-MM` and bare years (first day of the period).
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Some((date, _)) = raw.split_once('T') {
        if let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d") {
        return Some(date);
    }
    if raw.len() == 4 {
        if let Ok(year) = raw.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Publication,
    Street,
    CopyrightYear,
}

/// Derives a date column.
///
/// The publication date comes from metadata, then the `publication_date`
/// configuration key, then today plus `lead_days`. The street date is the
/// metadata street date or the publication date plus `offset_days`. The
/// copyright year is the metadata value or the publication date's year.
pub struct DateComputationStrategy {
    kind: DateKind,
    lead_days: i64,
    offset_days: i64,
    today: Option<NaiveDate>,
}

const OUTPUT_FORMAT: &str = "%Y-%m-%d";

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, MappingError> {
    Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .ok_or_else(|| MappingError::Misconfigured(format!("{} days from {} is out of range", days, date)))
}

impl DateComputationStrategy {
    pub fn new(kind: DateKind) -> Self {
        Self {
            kind,
            lead_days: 0,
            offset_days: 0,
            today: None,
        }
    }

    /// Days from today to the publication date when none is known.
    pub fn with_lead_days(mut self, lead_days: i64) -> Self {
        self.lead_days = lead_days;
        self
    }

    /// Street date relative to the publication date.
    pub fn with_offset_days(mut self, offset_days: i64) -> Self {
        self.offset_days = offset_days;
        self
    }

    /// Fix "today" for deterministic output.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn publication_date(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<NaiveDate, MappingError> {
        match parse_flexible_date(&metadata.publication_date)
            .or_else(|| context.lookup_str("publication_date").and_then(|d| parse_flexible_date(&d)))
        {
            Some(date) => Ok(date),
            None => shift(self.today(), self.lead_days),
        }
    }
}

#[async_trait]
impl MappingStrategy for DateComputationStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        match self.kind {
            DateKind::Publication => Ok(self.publication_date(metadata, context)?.format(OUTPUT_FORMAT).to_string()),
            DateKind::Street => {
                let date = match parse_flexible_date(&metadata.street_date) {
                    Some(date) => date,
                    None => shift(self.publication_date(metadata, context)?, self.offset_days)?,
                };
                Ok(date.format(OUTPUT_FORMAT).to_string())
            }
            DateKind::CopyrightYear => {
                let explicit = metadata.copyright_year.trim();
                if !explicit.is_empty() {
                    return match explicit.parse::<i32>() {
                        Ok(year) => Ok(year.to_string()),
                        Err(_) => Err(MappingError::invalid("copyright_year", format!("'{}' is not a year", explicit))),
                    };
                }
                Ok(self.publication_date(metadata, context)?.year().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::{json, Map};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_parse_flexible_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 1);
        for raw in ["2025-06-01", "06/01/2025", "2025/06/01", "June 01, 2025", "Jun 1, 2025", "1 June 2025", "20250601", "2025-06-01T10:00:00Z", "2025-06"] {
            assert_eq!(parse_flexible_date(raw), expected, "{}", raw);
        }
        assert_eq!(parse_flexible_date("2025"), NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(parse_flexible_date("soon"), None);
    }

    #[tokio::test]
    async fn test_publication_date_sources() {
        let s = DateComputationStrategy::new(DateKind::Publication).with_lead_days(90).with_today(today());
        let mut m = CodexMetadata::new("T", "A");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "2025-06-08");

        let cfg = json!({"publication_date": "2025-09-01"}).as_object().cloned().unwrap();
        assert_eq!(run(&s, &m, &cfg).await.unwrap(), "2025-09-01");

        m.publication_date = "April 2, 2026".into();
        assert_eq!(run(&s, &m, &cfg).await.unwrap(), "2026-04-02");
    }

    #[tokio::test]
    async fn test_street_date_offset_from_publication() {
        let s = DateComputationStrategy::new(DateKind::Street).with_offset_days(-7).with_today(today());
        let mut m = CodexMetadata::new("T", "A");
        m.publication_date = "2025-06-15".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "2025-06-08");

        m.street_date = "2025-07-01".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "2025-07-01");
    }

    #[tokio::test]
    async fn test_street_date_follows_fallback_publication_date() {
        let publication = DateComputationStrategy::new(DateKind::Publication).with_lead_days(90).with_today(today());
        let street = DateComputationStrategy::new(DateKind::Street)
            .with_lead_days(90)
            .with_offset_days(0)
            .with_today(today());
        let m = CodexMetadata::new("T", "A");
        let pub_date = run(&publication, &m, &Map::new()).await.unwrap();
        let street_date = run(&street, &m, &Map::new()).await.unwrap();
        assert_eq!(pub_date, "2025-06-08");
        assert!(street_date >= pub_date, "{} < {}", street_date, pub_date);

        let later = DateComputationStrategy::new(DateKind::Street)
            .with_lead_days(90)
            .with_offset_days(14)
            .with_today(today());
        assert_eq!(run(&later, &m, &Map::new()).await.unwrap(), "2025-06-22");
    }

    #[tokio::test]
    async fn test_huge_offsets_are_misconfigured() {
        let s = DateComputationStrategy::new(DateKind::Publication)
            .with_lead_days(1_000_000_000_000)
            .with_today(today());
        let err = run(&s, &CodexMetadata::default(), &Map::new()).await.unwrap_err();
        assert!(matches!(err, MappingError::Misconfigured(_)));

        let s = DateComputationStrategy::new(DateKind::Street).with_offset_days(i64::MAX).with_today(today());
        assert!(run(&s, &CodexMetadata::default(), &Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_copyright_year() {
        let s = DateComputationStrategy::new(DateKind::CopyrightYear).with_today(today());
        let mut m = CodexMetadata::new("T", "A");
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "2025");
        m.publication_date = "2027-01-05".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "2027");
        m.copyright_year = "MMXX".into();
        assert!(run(&s, &m, &Map::new()).await.is_err());
    }
}
