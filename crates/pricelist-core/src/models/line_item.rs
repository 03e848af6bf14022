//! Extracted price list records.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::vendor::patterns::{COST_TEXT, OUT_OF_STOCK_TOKEN, QUOTE_TOKEN};

/// Sentinel written for a record whose identifier is absent.
pub const ABSENT_ID: &str = "N/A";

/// Product identifier as printed on the price list, or the absent sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProductId {
    /// Identifier text as extracted.
    Present(String),
    /// Explicitly absent (`N/A`).
    Absent,
}

impl ProductId {
    /// Build an identifier, mapping sentinel spellings to [`ProductId::Absent`].
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_absent_marker(trimmed) {
            ProductId::Absent
        } else {
            ProductId::Present(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProductId::Present(id) => id,
            ProductId::Absent => ABSENT_ID,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ProductId::Absent)
    }
}

/// Whether `text` is one of the spellings of the absent sentinel.
pub fn is_absent_marker(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    matches!(upper.as_str(), "" | "N/A" | "NA" | "N.A." | "N/A." | "-" | "--")
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProductId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ProductId::new(&raw))
    }
}

/// Per-unit suffix on a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostUnit {
    PerPound,
    PerCase,
    PerEach,
}

impl CostUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            CostUnit::PerPound => "/LB",
            CostUnit::PerCase => "/CS",
            CostUnit::PerEach => "/EA",
        }
    }

    /// Parse a unit word such as `LB` or `/cs`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().trim_start_matches('/').trim().to_uppercase().as_str() {
            "LB" | "LBS" => Some(CostUnit::PerPound),
            "CS" | "CASE" => Some(CostUnit::PerCase),
            "EA" | "EACH" => Some(CostUnit::PerEach),
            _ => None,
        }
    }
}

/// A price, or one of the two non-numeric price states.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CostValue {
    /// Currency amount rounded to cents, 0.01 through 9999.99.
    Amount {
        value: Decimal,
        unit: Option<CostUnit>,
    },
    OutOfStock,
    QuoteRequired,
}

impl CostValue {
    /// Smallest accepted amount.
    pub const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
    /// Largest accepted amount.
    pub const MAX_AMOUNT: Decimal = Decimal::from_parts(999_999, 0, 0, false, 2);

    /// Round to cents and range-check. `None` when out of range.
    pub fn amount(value: Decimal, unit: Option<CostUnit>) -> Option<Self> {
        let mut rounded = value.round_dp(2);
        if rounded < Self::MIN_AMOUNT || rounded > Self::MAX_AMOUNT {
            return None;
        }
        rounded.rescale(2);
        Some(CostValue::Amount {
            value: rounded,
            unit,
        })
    }

    /// Numeric amount, if any.
    pub fn value(&self) -> Option<Decimal> {
        match self {
            CostValue::Amount { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for CostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostValue::Amount { value, unit } => {
                write!(f, "${}", value)?;
                if let Some(unit) = unit {
                    f.write_str(unit.suffix())?;
                }
                Ok(())
            }
            CostValue::OutOfStock => f.write_str("OUT OF STOCK"),
            CostValue::QuoteRequired => f.write_str("QUOTE REQUIRED"),
        }
    }
}

/// Error for cost text that is not a valid [`CostValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCost(pub String);

impl fmt::Display for InvalidCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cost: {}", self.0)
    }
}

impl std::error::Error for InvalidCost {}

impl FromStr for CostValue {
    type Err = InvalidCost;

    /// Vendor-neutral parse of a formatted cost.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if OUT_OF_STOCK_TOKEN.is_match(text) {
            return Ok(CostValue::OutOfStock);
        }
        if QUOTE_TOKEN.is_match(text) {
            return Ok(CostValue::QuoteRequired);
        }

        let caps = COST_TEXT
            .captures(text)
            .ok_or_else(|| InvalidCost(text.to_string()))?;
        let digits = caps[2].replace(',', "");
        let value = Decimal::from_str(&digits).map_err(|_| InvalidCost(text.to_string()))?;
        let unit = caps.get(3).and_then(|m| CostUnit::parse(m.as_str()));
        CostValue::amount(value, unit).ok_or_else(|| InvalidCost(text.to_string()))
    }
}

impl Serialize for CostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CostValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One extracted price list record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    /// Identifier as printed, or `N/A`.
    pub product_id: ProductId,
    pub description: String,
    pub cost: CostValue,
}

impl LineItem {
    pub fn new(product_id: ProductId, description: impl Into<String>, cost: CostValue) -> Self {
        Self {
            product_id,
            description: description.into(),
            cost,
        }
    }
}
