//! Data models shared across the pipeline.

pub mod batch;
pub mod config;
pub mod line_item;
pub mod matching;

pub use batch::{BatchState, BatchStatus, DocumentResult, DocumentStatus};
pub use config::PricelistConfig;
pub use line_item::{CostUnit, CostValue, LineItem, ProductId};
pub use matching::{CatalogEntry, MatchResult, MatchSummary, MatchedRecord, NO_MATCH};
