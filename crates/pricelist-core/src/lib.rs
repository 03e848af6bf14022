//! Core library for vendor price list extraction and catalog reconciliation.
//!
//! This crate provides:
//! - Vendor profiles and a rule-driven row/line parser
//! - PDF text layout and page image access
//! - OCR preprocessing, recognition and row reconstruction
//! - Three extraction strategies with per-vendor fallback
//! - Identifier normalization and catalog matching with AI fallback
//! - A bounded batch runner that persists after every document

pub mod ai;
pub mod batch;
pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod reconcile;
pub mod vendor;

pub use batch::{BatchRunner, DocumentJob, DocumentProcessor, JsonResultStore, ResultSink};
pub use error::{PricelistError, Result};
pub use extract::{ExtractionPipeline, Strategy};
pub use models::{LineItem, MatchResult, PricelistConfig};
pub use reconcile::{Catalog, MatchOptions, Reconciler};
pub use vendor::{detect_vendor_code, VendorParser};
