//! Document extraction: three strategies, the per-vendor selector, and aggregation.
//!
//! Each strategy turns one document into line items using the vendor's
//! [`VendorParser`]. The [`ExtractionPipeline`] runs them in the vendor's
//! order and falls back on failure.

pub mod aggregate;
mod ai;
mod image_ocr;
mod selector;
mod structured;

pub use aggregate::{dedup_exact, restructure_price_variants, Aggregator, PriceVariantRow};
pub use ai::{build_prompt, parse_csv_response, AiExtractor};
pub use image_ocr::ImageOcrExtractor;
pub use selector::ExtractionPipeline;
pub use structured::StructuredTextExtractor;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, PricelistError};
use crate::models::line_item::LineItem;
use crate::vendor::VendorParser;

/// One of the extraction techniques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    StructuredText,
    ImageOcr,
    Ai,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::StructuredText => "structured_text",
            Strategy::ImageOcr => "image_ocr",
            Strategy::Ai => "ai",
        }
    }

    /// Strategy order for a vendor. OCR is always the last resort.
    pub fn order_for(ai_preferred: bool) -> [Strategy; 2] {
        if ai_preferred {
            [Strategy::Ai, Strategy::ImageOcr]
        } else {
            [Strategy::StructuredText, Strategy::ImageOcr]
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A document handed to an extractor.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    /// Name used in logs, usually the file name.
    pub name: &'a str,
    pub bytes: &'a [u8],
}

impl<'a> SourceDocument<'a> {
    pub fn new(name: &'a str, bytes: &'a [u8]) -> Self {
        Self { name, bytes }
    }
}

/// An extraction strategy.
pub trait Extractor {
    fn strategy(&self) -> Strategy;

    /// Extract line items. An empty vector is a valid, if useless, answer.
    fn extract(&self, document: &SourceDocument<'_>, parser: &VendorParser) -> crate::Result<Vec<LineItem>>;
}

/// What one strategy produced for one document.
#[derive(Debug)]
pub enum StrategyOutcome {
    Succeeded(Vec<LineItem>),
    Failed(ExtractionError),
}

impl StrategyOutcome {
    /// Errors and empty results both count as failure.
    pub fn from_result(strategy: Strategy, result: Result<Vec<LineItem>, PricelistError>) -> Self {
        match result {
            Ok(items) if !items.is_empty() => StrategyOutcome::Succeeded(items),
            Ok(_) => StrategyOutcome::Failed(ExtractionError::StrategyFailed {
                strategy: strategy.name().to_string(),
                reason: "no records extracted".to_string(),
            }),
            Err(e) => StrategyOutcome::Failed(ExtractionError::StrategyFailed {
                strategy: strategy.name().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
