//! PDF processing module.

mod extractor;
pub mod layout;
mod render;

pub use extractor::PdfExtractor;
pub use layout::{TextLine, TextRun};
pub use render::{PageRenderer, PdftoppmRenderer};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
///
/// Pages are numbered from 1.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Plain text of a page, in content order.
    fn extract_page_text(&self, page: u32) -> Result<String>;

    /// Shown strings of a page with their positions in points.
    fn text_runs(&self, page: u32) -> Result<Vec<TextRun>>;

    /// Page width and height in points.
    fn page_size(&self, page: u32) -> Result<(f32, f32)>;

    /// Render a page as an image at the specified DPI.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage>;

    /// Extract embedded images from a page.
    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>>;
}
