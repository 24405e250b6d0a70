//! Weight, spine width and thickness from page count and paper stock.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::CodexMetadata;
use async_trait::async_trait;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Spine allowance added to every book, in inches.
pub const SPINE_ALLOWANCE_IN: f64 = 0.02;

/// Reference trim area (6 x 9) for per-page weights.
const REFERENCE_TRIM_AREA: f64 = 54.0;

/// Paper stock with per-page thickness (inches) and weight (pounds per page
/// at a 6 x 9 trim).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperStock {
    pub name: &'static str,
    pub thickness_per_page: f64,
    pub weight_per_page: f64,
}

const PAPER_STOCKS: &[PaperStock] = &[
    PaperStock { name: "standard", thickness_per_page: 0.002, weight_per_page: 0.0025 },
    PaperStock { name: "cream", thickness_per_page: 0.0025, weight_per_page: 0.0026 },
    PaperStock { name: "color", thickness_per_page: 0.0023, weight_per_page: 0.0032 },
    PaperStock { name: "groundwood", thickness_per_page: 0.0022, weight_per_page: 0.0024 },
];

impl PaperStock {
    /// Stock by name. "white" and empty names mean standard.
    pub fn named(name: &str) -> Option<PaperStock> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "" | "white" | "standard" | "standard white" => "standard",
            s if s.contains("cream") => "cream",
            s if s.contains("color") || s.contains("colour") => "color",
            s if s.contains("groundwood") => "groundwood",
            other => other,
        };
        PAPER_STOCKS.iter().copied().find(|p| p.name == key)
    }

    pub fn spine_width(&self, pages: u32) -> f64 {
        pages as f64 * self.thickness_per_page + SPINE_ALLOWANCE_IN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalSpec {
    Weight,
    SpineWidth,
    Thickness,
}

impl FromStr for PhysicalSpec {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::metadata::normalize_key(s).as_str() {
            "weight" | "weight_lbs" => Ok(Self::Weight),
            "spine_width" | "spine" => Ok(Self::SpineWidth),
            "thickness" => Ok(Self::Thickness),
            other => Err(MappingError::Misconfigured(format!("unknown physical spec '{}'", other))),
        }
    }
}

/// Parse "6x9", `6" x 9"`, "6 X 9 in" into (width, height) inches.
pub fn parse_trim_size(raw: &str) -> Option<(f64, f64)> {
    static TRIM: OnceLock<Regex> = OnceLock::new();
    let re = TRIM.get_or_init(|| {
        Regex::new(r#"(?i)(\d+(?:\.\d+)?)\s*"?\s*(?:in)?\s*[x×]\s*(\d+(?:\.\d+)?)"#).expect("static regex")
    });
    let caps = re.captures(raw)?;
    let w: f64 = caps[1].parse().ok()?;
    let h: f64 = caps[2].parse().ok()?;
    (w > 0.0 && h > 0.0).then_some((w, h))
}

/// Trim (width, height) in inches, 6x9 when unset.
pub fn trim_dimensions(metadata: &CodexMetadata) -> (f64, f64) {
    if let Some(trim) = parse_trim_size(&metadata.trim_size) {
        return trim;
    }
    match (metadata.trim_width.trim().parse::<f64>(), metadata.trim_height.trim().parse::<f64>()) {
        (Ok(w), Ok(h)) if w > 0.0 && h > 0.0 => (w, h),
        _ => (6.0, 9.0),
    }
}

fn is_hardcover(metadata: &CodexMetadata) -> bool {
    let binding = format!("{} {}", metadata.binding, metadata.rendition_booktype).to_lowercase();
    binding.contains("hard") || binding.contains("case") || binding.contains("cloth")
}

/// Derives a physical dimension from page count. The book's own paper type
/// wins over the strategy's configured stock when it names a known stock.
pub struct PhysicalSpecsStrategy {
    spec: PhysicalSpec,
    paper: PaperStock,
}

impl PhysicalSpecsStrategy {
    pub fn new(spec: PhysicalSpec, paper_type: &str) -> Result<Self, MappingError> {
        let paper = PaperStock::named(paper_type)
            .ok_or_else(|| MappingError::Misconfigured(format!("unknown paper type '{}'", paper_type)))?;
        Ok(Self { spec, paper })
    }

    fn paper_for(&self, metadata: &CodexMetadata) -> PaperStock {
        if metadata.paper_type.trim().is_empty() {
            return self.paper;
        }
        PaperStock::named(&metadata.paper_type).unwrap_or(self.paper)
    }
}

#[async_trait]
impl MappingStrategy for PhysicalSpecsStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, _context: &MappingContext<'_>) -> Result<String, MappingError> {
        let pages = metadata.page_count;
        if pages == 0 {
            return Err(MappingError::MissingInput("page count".into()));
        }
        let paper = self.paper_for(metadata);
        let hardcover = is_hardcover(metadata);

        Ok(match self.spec {
            PhysicalSpec::SpineWidth => format!("{:.2}\"", paper.spine_width(pages)),
            PhysicalSpec::Thickness => {
                let boards = if hardcover { 0.1 } else { 0.01 };
                format!("{:.2}\"", paper.spine_width(pages) + 2.0 * boards)
            }
            PhysicalSpec::Weight => {
                let (w, h) = trim_dimensions(metadata);
                let cover = if hardcover { 0.4 } else { 0.1 };
                let weight = pages as f64 * paper.weight_per_page * (w * h / REFERENCE_TRIM_AREA) + cover;
                format!("{:.2}", weight)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::Map;

    fn book(pages: u32) -> CodexMetadata {
        let mut m = CodexMetadata::new("Physical", "A");
        m.page_count = pages;
        m
    }

    #[tokio::test]
    async fn test_spine_width_standard_paper() {
        let s = PhysicalSpecsStrategy::new(PhysicalSpec::SpineWidth, "standard").unwrap();
        assert_eq!(run(&s, &book(300), &Map::new()).await.unwrap(), "0.62\"");
    }

    #[tokio::test]
    async fn test_book_paper_type_overrides_default() {
        let s = PhysicalSpecsStrategy::new(PhysicalSpec::SpineWidth, "standard").unwrap();
        let mut m = book(200);
        m.paper_type = "Cream".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "0.52\"");
    }

    #[tokio::test]
    async fn test_weight_scales_with_trim() {
        let s = PhysicalSpecsStrategy::new(PhysicalSpec::Weight, "standard").unwrap();
        let mut m = book(200);
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "0.60");
        m.trim_size = "8.5 x 11".into();
        // 200 * 0.0025 * (93.5 / 54) + 0.1
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "0.97");
    }

    #[tokio::test]
    async fn test_thickness_and_missing_pages() {
        let s = PhysicalSpecsStrategy::new(PhysicalSpec::Thickness, "standard").unwrap();
        let mut m = book(100);
        m.binding = "Hardcover".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "0.42\"");
        assert!(matches!(
            run(&s, &book(0), &Map::new()).await,
            Err(MappingError::MissingInput(_))
        ));
    }

    #[test]
    fn test_parse_trim_size() {
        assert_eq!(parse_trim_size("6x9"), Some((6.0, 9.0)));
        assert_eq!(parse_trim_size("5.5\" x 8.5\""), Some((5.5, 8.5)));
        assert_eq!(parse_trim_size("6 in X 9 in"), Some((6.0, 9.0)));
        assert_eq!(parse_trim_size("letter"), None);
        assert!(PhysicalSpecsStrategy::new(PhysicalSpec::Weight, "vellum").is_err());
    }
}
