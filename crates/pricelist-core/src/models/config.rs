//! Configuration structures for the extraction and matching pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration, constructed once and passed into extractors and matchers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricelistConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Image preprocessing applied before OCR.
    pub preprocess: PreprocessConfig,

    /// Generative model configuration.
    pub ai: AiConfig,

    /// Catalog matching configuration.
    pub matching: MatchingConfig,

    /// Batch runner configuration.
    pub batch: BatchConfig,
}

/// How recognized OCR tokens are turned into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Each recognized text line goes through the vendor's line parser.
    Lines,
    /// Confident tokens are clustered into spatial rows for the row parser.
    Grid,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Base URL the `models download` command fetches files from.
    pub download_base_url: Option<String>,

    /// Tokens below this recognition confidence are dropped in grid mode.
    pub min_token_confidence: f32,

    /// Vertical distance in pixels within which token centers share a row.
    pub row_tolerance_px: f32,

    /// Default consumption mode when the vendor profile does not force one.
    pub mode: OcrMode,

    /// Horizontal gap, in multiples of the average glyph width, rendered as a column break.
    pub space_gap_ratio: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            download_base_url: None,
            min_token_confidence: 0.30,
            row_tolerance_px: 10.0,
            mode: OcrMode::Lines,
            space_gap_ratio: 1.5,
        }
    }
}

impl OcrConfig {
    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.model_dir.join(model_name)
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI for rasterizing pages before OCR.
    pub render_dpi: u32,

    /// `pdftoppm` executable used to rasterize pages.
    pub pdftoppm_path: String,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,

    /// Vertical distance in points within which text runs share a line.
    pub line_tolerance: f32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 400,
            pdftoppm_path: "pdftoppm".to_string(),
            max_pages: 0,
            line_tolerance: 3.0,
        }
    }
}

/// Preprocessing chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// CLAHE clip limit.
    pub clahe_clip_limit: f32,

    /// CLAHE tile grid size (tiles per side).
    pub clahe_grid: u32,

    /// Bilateral filter neighbourhood diameter.
    pub bilateral_diameter: u32,

    /// Bilateral filter sigma in intensity space.
    pub bilateral_sigma_color: f32,

    /// Bilateral filter sigma in coordinate space.
    pub bilateral_sigma_space: f32,

    /// Adaptive threshold block size (odd).
    pub threshold_block_size: u32,

    /// Constant subtracted from the weighted local mean.
    pub threshold_c: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_grid: 8,
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            threshold_block_size: 11,
            threshold_c: 2.0,
        }
    }
}

/// Generative model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// API key. Falls back to `GEMINI_API_KEY` when unset.
    pub api_key: Option<String>,

    /// Service base URL.
    pub base_url: String,

    /// Model used for document extraction.
    pub extraction_model: String,

    /// Model used for catalog matching.
    pub matching_model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            extraction_model: "gemini-2.5-pro".to_string(),
            matching_model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.1,
            timeout_secs: None,
        }
    }
}

impl AiConfig {
    /// Configured key, or the environment fallback.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
    }
}

/// Catalog matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Never consult the AI; ambiguous cases take the deterministic outcome.
    pub use_id_only: bool,

    /// Route absent or ambiguous identifiers to AI matching.
    pub use_ai_fallback: bool,

    /// Skip identifier matching and send every record to the AI.
    pub use_ai_only: bool,

    /// Maximum catalog entries offered to the AI.
    pub candidate_cap: usize,

    /// Minimum confidence the AI is told to require before matching.
    pub confidence_threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            use_id_only: false,
            use_ai_fallback: true,
            use_ai_only: false,
            candidate_cap: 500,
            confidence_threshold: 0.8,
        }
    }
}

/// Batch runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrently processed documents.
    pub max_workers: usize,

    /// File name for the rewritten result collection.
    pub results_file: String,

    /// File name for the progress record.
    pub status_file: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            results_file: "results.json".to_string(),
            status_file: "status.json".to_string(),
        }
    }
}

impl PricelistConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}
