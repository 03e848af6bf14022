//! Rows recovered by rasterizing pages and running OCR.

use std::cell::OnceCell;
use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, info};

use super::aggregate::Aggregator;
use super::{Extractor, SourceDocument, Strategy};
use crate::error::OcrError;
use crate::models::config::{OcrConfig, OcrMode, PdfConfig, PreprocessConfig};
use crate::models::line_item::LineItem;
use crate::ocr::{assemble_lines, create_backend, group_into_rows, ImagePreprocessor, OcrBackend};
use crate::pdf::{PageRenderer, PdfExtractor, PdfProcessor, PdftoppmRenderer};
use crate::vendor::VendorParser;

/// Renders each page, cleans it up, and feeds recognized text to the parser.
///
/// The OCR backend loads on first use, so building the extractor is cheap
/// even when the models are missing.
pub struct ImageOcrExtractor {
    ocr: OcrConfig,
    pdf: PdfConfig,
    preprocessor: ImagePreprocessor,
    renderer: Arc<dyn PageRenderer>,
    backend: OnceCell<Box<dyn OcrBackend>>,
}

impl ImageOcrExtractor {
    pub fn new(ocr: OcrConfig, pdf: PdfConfig, preprocess: PreprocessConfig) -> Self {
        let renderer = Arc::new(PdftoppmRenderer::new(pdf.pdftoppm_path.as_str()));
        Self {
            ocr,
            pdf,
            preprocessor: ImagePreprocessor::new(preprocess),
            renderer,
            backend: OnceCell::new(),
        }
    }

    /// Rasterize pages with `renderer` instead of `pdftoppm`.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Use an already constructed backend instead of loading models.
    pub fn with_backend(mut self, backend: Box<dyn OcrBackend>) -> Self {
        self.backend = OnceCell::from(backend);
        self
    }

    fn backend(&self) -> Result<&dyn OcrBackend, OcrError> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend.as_ref());
        }
        let loaded = create_backend(&self.ocr)?;
        Ok(self.backend.get_or_init(|| loaded).as_ref())
    }

    fn mode_for(&self, parser: &VendorParser) -> OcrMode {
        parser.profile().ocr_mode.unwrap_or(self.ocr.mode)
    }

    /// Items from one rendered page.
    fn page_items(&self, image: &DynamicImage, parser: &VendorParser) -> crate::Result<Vec<LineItem>> {
        let cleaned = DynamicImage::ImageLuma8(self.preprocessor.apply(image)?);
        let result = self.backend()?.recognize(&cleaned)?;

        let items = match self.mode_for(parser) {
            OcrMode::Lines => assemble_lines(&result, self.ocr.space_gap_ratio)
                .iter()
                .filter_map(|line| parser.parse_line(line))
                .collect(),
            OcrMode::Grid => group_into_rows(&result, self.ocr.min_token_confidence, self.ocr.row_tolerance_px)
                .iter()
                .filter_map(|row| parser.parse_row(row))
                .collect(),
        };
        Ok(items)
    }
}

impl Extractor for ImageOcrExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::ImageOcr
    }

    fn extract(&self, document: &SourceDocument<'_>, parser: &VendorParser) -> crate::Result<Vec<LineItem>> {
        let pdf = PdfExtractor::from_bytes(document.bytes)?.with_renderer(Arc::clone(&self.renderer));
        let mut pages = pdf.page_count();
        if self.pdf.max_pages > 0 {
            pages = pages.min(self.pdf.max_pages as u32);
        }
        info!(
            document = document.name,
            strategy = "image_ocr",
            pages,
            dpi = self.pdf.render_dpi,
            mode = ?self.mode_for(parser),
            "running OCR"
        );

        let mut aggregator = Aggregator::new();
        for page in 1..=pages {
            let image = pdf.render_page(page, self.pdf.render_dpi)?;
            let items = self.page_items(&image, parser)?;
            let found = items.len();
            let kept = aggregator.extend(items);
            debug!(document = document.name, strategy = "image_ocr", page, found, kept, "page recognized");
        }

        Ok(aggregator.into_items())
    }
}
