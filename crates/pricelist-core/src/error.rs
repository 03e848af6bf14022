//! Error types for the pricelist-core library.

use thiserror::Error;

/// Main error type for the pricelist library.
#[derive(Error, Debug)]
pub enum PricelistError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Document extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Catalog loading error.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Generative model error.
    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The batch worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// Rasterizing a page failed.
    #[error("failed to render page: {0}")]
    Render(String),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The recognition engine failed on an image.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// OCR was requested but no engine is available.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while extracting line items from a document.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// One strategy errored or produced nothing.
    #[error("{strategy} strategy failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// Every strategy in the vendor's ordered list failed.
    #[error("all extraction strategies failed for {document}: {}", attempts.join("; "))]
    AllStrategiesFailed {
        document: String,
        attempts: Vec<String>,
    },

    /// Vendor code has no profile.
    #[error("unknown vendor: {0}")]
    UnknownVendor(String),
}

/// Errors raised while loading the reference catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog source could not be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// A required column is missing from the header row.
    #[error("catalog is missing a {0} column")]
    MissingColumn(&'static str),

    /// No usable rows survived loading.
    #[error("catalog contains no usable entries")]
    Empty,

    /// Malformed CSV input.
    #[error("malformed catalog row: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors from the external generative model.
#[derive(Error, Debug)]
pub enum AiError {
    /// No API key is configured.
    #[error("no API key configured")]
    MissingApiKey,

    /// The HTTP request failed before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response carried no text.
    #[error("empty response from model")]
    EmptyResponse,
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Transport(err.to_string())
    }
}

/// Result type for the pricelist library.
pub type Result<T> = std::result::Result<T, PricelistError>;
