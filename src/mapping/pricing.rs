//! Territorial pricing, market parity pricing and wholesale discounts.

use super::{MappingContext, MappingStrategy};
use crate::error::MappingError;
use crate::metadata::{parse_price, CodexMetadata, MetadataField};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Currency conversion and display for one territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryPricing {
    pub code: String,
    /// Units of local currency per US dollar.
    pub rate: f64,
    pub symbol: String,
    /// Output template with `{symbol}` and `{price}` placeholders.
    pub format: String,
    pub decimals: usize,
}

impl TerritoryPricing {
    fn new(code: &str, rate: f64, symbol: &str, decimals: usize) -> Self {
        Self {
            code: code.to_string(),
            rate,
            symbol: symbol.to_string(),
            format: "{symbol}{price}".to_string(),
            decimals,
        }
    }

    pub fn format(&self, value: f64) -> String {
        format_price(value, &self.symbol, &self.format, self.decimals)
    }
}

/// Built-in conversion for a converted territory code.
pub fn default_territory(code: &str) -> Option<TerritoryPricing> {
    let t = match code.to_ascii_uppercase().as_str() {
        "US" => TerritoryPricing::new("US", 1.0, "$", 2),
        "UK" => TerritoryPricing::new("UK", 0.79, "£", 2),
        "EU" => TerritoryPricing::new("EU", 0.92, "€", 2),
        "CA" => TerritoryPricing::new("CA", 1.35, "$", 2),
        "AU" => TerritoryPricing::new("AU", 1.52, "$", 2),
        "GC" => TerritoryPricing::new("GC", 1.0, "$", 2),
        "JP" => TerritoryPricing::new("JP", 150.0, "¥", 0),
        "IN" => TerritoryPricing::new("IN", 83.0, "₹", 0),
        _ => return None,
    };
    Some(t)
}

/// How a converted price is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Two decimal places, no psychological rounding.
    Exact,
    /// Whole currency units.
    #[default]
    Nearest,
    Up,
    Down,
    Nearest99,
    Nearest95,
    Nearest50,
}

impl FromStr for RoundingRule {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "exact" | "none" => Self::Exact,
            "nearest" | "" => Self::Nearest,
            "up" | "ceil" => Self::Up,
            "down" | "floor" => Self::Down,
            "nearest_99" | "99" => Self::Nearest99,
            "nearest_95" | "95" => Self::Nearest95,
            "nearest_50" | "50" => Self::Nearest50,
            other => return Err(MappingError::Misconfigured(format!("unknown rounding rule '{}'", other))),
        })
    }
}

pub fn round_price(value: f64, rule: RoundingRule) -> f64 {
    let rounded = match rule {
        RoundingRule::Exact => (value * 100.0).round() / 100.0,
        RoundingRule::Nearest => value.round(),
        RoundingRule::Up => value.ceil(),
        RoundingRule::Down => value.floor(),
        RoundingRule::Nearest99 => value.round().max(1.0) - 0.01,
        RoundingRule::Nearest95 => value.round().max(1.0) - 0.05,
        RoundingRule::Nearest50 => (value * 2.0).round() / 2.0,
    };
    rounded.max(0.0)
}

pub fn format_price(value: f64, symbol: &str, template: &str, decimals: usize) -> String {
    let price = format!("{:.*}", decimals, value);
    template.replace("{symbol}", symbol).replace("{price}", &price)
}

/// US list price from metadata, falling back to configuration.
fn us_list_price(metadata: &CodexMetadata, context: &MappingContext<'_>) -> Option<f64> {
    if metadata.list_price_usd > 0.0 {
        return Some(metadata.list_price_usd);
    }
    ["list_price_usd", "us_list_price", "list_price"]
        .iter()
        .find_map(|key| context.lookup_str(key))
        .and_then(|raw| parse_price(&raw))
        .filter(|p| *p > 0.0)
}

fn missing_us_price() -> MappingError {
    MappingError::MissingInput("US list price".into())
}

/// Converted prices keyed by (book uuid, territory, US price in cents).
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: RwLock<HashMap<(String, String, i64), String>>,
}

impl PriceCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn get(&self, key: &(String, String, i64)) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: (String, String, i64), value: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts the US list price into a territory's currency.
///
/// An explicit per-territory price on the metadata wins. Exchange rates can
/// be overridden through an `exchange_rates` configuration object.
pub struct TerritorialPricingStrategy {
    territory: TerritoryPricing,
    explicit: Option<MetadataField>,
    cache: Arc<PriceCache>,
}

impl TerritorialPricingStrategy {
    pub fn new(territory: TerritoryPricing, cache: Arc<PriceCache>) -> Self {
        let explicit = match territory.code.as_str() {
            "UK" => Some(MetadataField::UkListPrice),
            "EU" => Some(MetadataField::EuListPrice),
            "AU" => Some(MetadataField::AuListPrice),
            "CA" => Some(MetadataField::CaListPrice),
            _ => None,
        };
        Self {
            territory,
            explicit,
            cache,
        }
    }

    /// Strategy for a built-in territory code.
    pub fn for_territory(code: &str, cache: Arc<PriceCache>) -> Result<Self, MappingError> {
        default_territory(code)
            .map(|t| Self::new(t, cache))
            .ok_or_else(|| MappingError::Misconfigured(format!("no pricing for territory '{}'", code)))
    }

    fn rate(&self, context: &MappingContext<'_>) -> f64 {
        context
            .lookup("exchange_rates")
            .and_then(|rates| rates.get(&self.territory.code).and_then(|v| v.as_f64()))
            .filter(|r| *r > 0.0)
            .unwrap_or(self.territory.rate)
    }

    fn rounding(&self, context: &MappingContext<'_>) -> RoundingRule {
        context
            .lookup_str("price_rounding")
            .and_then(|r| r.parse().ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MappingStrategy for TerritorialPricingStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        if let Some(explicit) = self.explicit.map(|f| metadata.get(f)) {
            if let Some(price) = parse_price(&explicit) {
                return Ok(self.territory.format(price));
            }
        }

        let usd = us_list_price(metadata, context).ok_or_else(missing_us_price)?;
        let key = (
            metadata.uuid.clone(),
            self.territory.code.clone(),
            (usd * 100.0).round() as i64,
        );
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let converted = round_price(usd * self.rate(context), self.rounding(context));
        let formatted = self.territory.format(converted);
        debug!("{} price for {}: {}", self.territory.code, metadata.shortuuid, formatted);
        self.cache.insert(key, formatted.clone());
        Ok(formatted)
    }
}

/// USD-denominated markets priced at parity with the US list price.
pub struct MarketPricingStrategy {
    market: String,
}

impl MarketPricingStrategy {
    pub fn new(market: impl Into<String>) -> Self {
        Self { market: market.into() }
    }
}

#[async_trait]
impl MappingStrategy for MarketPricingStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let usd = us_list_price(metadata, context)
            .ok_or_else(|| MappingError::MissingInput(format!("US list price for {}", self.market)))?;
        Ok(format_price(usd, "$", "{symbol}{price}", 2))
    }
}

/// The US list price itself.
pub struct USPricingStrategy;

#[async_trait]
impl MappingStrategy for USPricingStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let usd = us_list_price(metadata, context).ok_or_else(missing_us_price)?;
        Ok(format_price(usd, "$", "{symbol}{price}", 2))
    }
}

/// Wholesale discount percentage for a territory.
///
/// Resolved from the metadata's explicit discount, then the
/// `<territory>_wholesale_discount` configuration key, then the generic
/// `wholesale_discount_percent` key, then the strategy default.
pub struct DiscountStrategy {
    territory: String,
    default_percent: f64,
}

impl DiscountStrategy {
    pub fn new(territory: impl Into<String>, default_percent: f64) -> Self {
        Self {
            territory: territory.into(),
            default_percent,
        }
    }

    fn explicit_field(&self) -> Option<MetadataField> {
        match self.territory.to_ascii_uppercase().as_str() {
            "US" => Some(MetadataField::UsWholesaleDiscount),
            "UK" => Some(MetadataField::UkWholesaleDiscount),
            "EU" => Some(MetadataField::EuWholesaleDiscount),
            "AU" => Some(MetadataField::AuWholesaleDiscount),
            "CA" => Some(MetadataField::CaWholesaleDiscount),
            _ => None,
        }
    }
}

#[async_trait]
impl MappingStrategy for DiscountStrategy {
    async fn map_field(&self, metadata: &CodexMetadata, context: &MappingContext<'_>) -> Result<String, MappingError> {
        let territory_key = format!("{}_wholesale_discount", self.territory.to_ascii_lowercase());
        let percent = self
            .explicit_field()
            .map(|f| metadata.get(f))
            .filter(|v| !v.trim().is_empty())
            .or_else(|| context.lookup_str(&territory_key))
            .or_else(|| context.lookup_str("wholesale_discount_percent"))
            .map(|raw| {
                parse_price(&raw).ok_or_else(|| MappingError::invalid(&territory_key, format!("'{}' is not a percentage", raw)))
            })
            .transpose()?
            .unwrap_or(self.default_percent);

        if !(0.0..=100.0).contains(&percent) {
            return Err(MappingError::invalid(territory_key, format!("{} is outside 0-100", percent)));
        }
        Ok(format_percent(percent))
    }
}

fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{}", percent as i64)
    } else {
        format!("{:.1}", percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::basic::tests::run;
    use serde_json::{json, Map, Value};

    fn book(price: f64) -> CodexMetadata {
        let mut m = CodexMetadata::new("Priced", "A");
        m.list_price_usd = price;
        m
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_canadian_conversion() {
        let s = TerritorialPricingStrategy::for_territory("CA", PriceCache::new()).unwrap();
        assert_eq!(run(&s, &book(20.0), &Map::new()).await.unwrap(), "$27.00");
    }

    #[tokio::test]
    async fn test_default_rounding_is_whole_units() {
        let s = TerritorialPricingStrategy::for_territory("CA", PriceCache::new()).unwrap();
        assert_eq!(run(&s, &book(19.99), &Map::new()).await.unwrap(), "$27.00");
    }

    #[tokio::test]
    async fn test_rounding_rules_and_rate_override() {
        let s = TerritorialPricingStrategy::for_territory("UK", PriceCache::new()).unwrap();
        let cfg = config(json!({"price_rounding": "nearest_99"}));
        assert_eq!(run(&s, &book(19.99), &cfg).await.unwrap(), "£15.99");

        let s = TerritorialPricingStrategy::for_territory("UK", PriceCache::new()).unwrap();
        let cfg = config(json!({"price_rounding": "exact"}));
        assert_eq!(run(&s, &book(19.99), &cfg).await.unwrap(), "£15.79");

        let cfg = config(json!({"exchange_rates": {"UK": 0.5}}));
        let s = TerritorialPricingStrategy::for_territory("UK", PriceCache::new()).unwrap();
        assert_eq!(run(&s, &book(20.0), &cfg).await.unwrap(), "£10.00");

        let s = TerritorialPricingStrategy::for_territory("JP", PriceCache::new()).unwrap();
        assert_eq!(run(&s, &book(20.0), &Map::new()).await.unwrap(), "¥3000");
    }

    #[tokio::test]
    async fn test_explicit_territory_price_wins() {
        let s = TerritorialPricingStrategy::for_territory("CA", PriceCache::new()).unwrap();
        let mut m = book(20.0);
        m.ca_list_price = "29.95".into();
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "$29.95");
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_price() {
        let cache = PriceCache::new();
        let s = TerritorialPricingStrategy::for_territory("EU", cache.clone()).unwrap();
        let mut m = book(10.0);
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "€9.00");
        m.list_price_usd = 20.0;
        assert_eq!(run(&s, &m, &Map::new()).await.unwrap(), "€18.00");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_price_is_an_error() {
        let s = TerritorialPricingStrategy::for_territory("CA", PriceCache::new()).unwrap();
        let err = run(&s, &book(0.0), &Map::new()).await.unwrap_err();
        assert!(matches!(err, MappingError::MissingInput(_)));

        let cfg = config(json!({"us_list_price": "$12.50"}));
        assert_eq!(run(&USPricingStrategy, &book(0.0), &cfg).await.unwrap(), "$12.50");
        assert_eq!(run(&MarketPricingStrategy::new("USBR1"), &book(9.5), &Map::new()).await.unwrap(), "$9.50");
    }

    #[tokio::test]
    async fn test_discount_resolution() {
        let s = DiscountStrategy::new("UK", 40.0);
        assert_eq!(run(&s, &book(1.0), &Map::new()).await.unwrap(), "40");

        let cfg = config(json!({"uk_wholesale_discount": "45%"}));
        assert_eq!(run(&s, &book(1.0), &cfg).await.unwrap(), "45");

        let mut m = book(1.0);
        m.uk_wholesale_discount = "52.5".into();
        assert_eq!(run(&s, &m, &cfg).await.unwrap(), "52.5");

        m.uk_wholesale_discount = "150".into();
        assert!(run(&s, &m, &cfg).await.is_err());
    }

    #[test]
    fn test_rounding_rule_parsing() {
        assert_eq!("nearest-99".parse::<RoundingRule>().unwrap(), RoundingRule::Nearest99);
        assert_eq!("none".parse::<RoundingRule>().unwrap(), RoundingRule::Exact);
        assert_eq!(RoundingRule::default(), RoundingRule::Nearest);
        assert!("sideways".parse::<RoundingRule>().is_err());
        assert!((round_price(0.2, RoundingRule::Nearest95) - 0.95).abs() < 1e-9);
        assert_eq!(round_price(12.3, RoundingRule::Nearest50), 12.5);
    }
}
