//! Per-vendor strategy ordering with fallback.

use std::sync::Arc;

use tracing::{info, warn};

use super::{
    AiExtractor, Extractor, ImageOcrExtractor, SourceDocument, Strategy, StrategyOutcome,
    StructuredTextExtractor,
};
use crate::ai::{GeminiClient, GenerativeModel};
use crate::batch::{DocumentJob, DocumentProcessor};
use crate::error::ExtractionError;
use crate::models::config::PricelistConfig;
use crate::models::line_item::LineItem;
use crate::ocr::OcrBackend;
use crate::pdf::PageRenderer;
use crate::vendor::VendorParser;

/// Runs a vendor's strategies in order until one yields records.
pub struct ExtractionPipeline {
    structured: StructuredTextExtractor,
    ocr: ImageOcrExtractor,
    ai: Option<AiExtractor>,
}

impl ExtractionPipeline {
    /// Pipeline without a generative model; AI-preferred vendors go straight to OCR.
    pub fn new(config: &PricelistConfig) -> Self {
        Self {
            structured: StructuredTextExtractor::new(config.pdf.clone()),
            ocr: ImageOcrExtractor::new(config.ocr.clone(), config.pdf.clone(), config.preprocess.clone()),
            ai: None,
        }
    }

    /// Pipeline with the configured Gemini client when an API key is available.
    pub fn from_config(config: &PricelistConfig) -> Self {
        let pipeline = Self::new(config);
        match GeminiClient::for_extraction(&config.ai) {
            Ok(client) => pipeline.with_model(Box::new(client)),
            Err(e) => {
                info!(error = %e, "AI extraction disabled");
                pipeline
            }
        }
    }

    pub fn with_model(mut self, model: Box<dyn GenerativeModel>) -> Self {
        self.ai = Some(AiExtractor::new(model));
        self
    }

    pub fn with_ocr_backend(mut self, backend: Box<dyn OcrBackend>) -> Self {
        self.ocr = self.ocr.with_backend(backend);
        self
    }

    pub fn with_page_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.ocr = self.ocr.with_renderer(renderer);
        self
    }

    /// Strategies attempted for a vendor, in order.
    pub fn strategies_for(&self, parser: &VendorParser) -> Vec<Strategy> {
        Strategy::order_for(parser.profile().ai_preferred)
            .into_iter()
            .filter(|s| *s != Strategy::Ai || self.ai.is_some())
            .collect()
    }

    fn extractor(&self, strategy: Strategy) -> Option<&dyn Extractor> {
        match strategy {
            Strategy::StructuredText => Some(&self.structured as &dyn Extractor),
            Strategy::ImageOcr => Some(&self.ocr as &dyn Extractor),
            Strategy::Ai => self.ai.as_ref().map(|a| a as &dyn Extractor),
        }
    }

    /// Extract one document, falling back through the vendor's strategies.
    ///
    /// Fails only when every strategy errored or found nothing.
    pub fn extract(&self, document: &SourceDocument<'_>, parser: &VendorParser) -> Result<Vec<LineItem>, ExtractionError> {
        let mut attempts = Vec::new();

        for strategy in self.strategies_for(parser) {
            let Some(extractor) = self.extractor(strategy) else {
                continue;
            };
            info!(document = document.name, strategy = strategy.name(), vendor = parser.profile().code, "trying strategy");

            match StrategyOutcome::from_result(strategy, extractor.extract(document, parser)) {
                StrategyOutcome::Succeeded(items) => {
                    info!(document = document.name, strategy = strategy.name(), items = items.len(), "extraction succeeded");
                    return Ok(items);
                }
                StrategyOutcome::Failed(e) => {
                    warn!(document = document.name, strategy = strategy.name(), error = %e, "strategy failed, falling back");
                    attempts.push(e.to_string());
                }
            }
        }

        Err(ExtractionError::AllStrategiesFailed {
            document: document.name.to_string(),
            attempts,
        })
    }
}

impl DocumentProcessor for ExtractionPipeline {
    fn process(&self, job: &DocumentJob) -> Result<Vec<LineItem>, ExtractionError> {
        let parser = VendorParser::for_code(&job.vendor_code);
        self.extract(&SourceDocument::new(&job.filename, &job.bytes), &parser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::structured::tests::price_sheet;
    use crate::ai::Attachment;
    use crate::error::{AiError, OcrError};
    use crate::ocr::{OcrResult, TextBox};
    use image::{DynamicImage, GrayImage, Luma};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Canned(&'static str);

    impl GenerativeModel for Canned {
        fn generate(&self, _prompt: &str, _attachment: Option<Attachment<'_>>) -> Result<String, AiError> {
            if self.0.is_empty() {
                Err(AiError::Transport("connection refused".to_string()))
            } else {
                Ok(self.0.to_string())
            }
        }
    }

    /// Blank page, counting calls.
    #[derive(Default)]
    struct WhitePage {
        rendered: AtomicU32,
    }

    impl PageRenderer for WhitePage {
        fn render(&self, _pdf: &[u8], _page: u32, dpi: u32) -> crate::pdf::Result<DynamicImage> {
            assert_eq!(dpi, 400);
            self.rendered.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255]))))
        }
    }

    struct CannedOcr(Vec<(f32, &'static str)>);

    impl OcrBackend for CannedOcr {
        fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError> {
            let boxes = self
                .0
                .iter()
                .map(|(x, text)| {
                    let w = text.len() as f32 * 10.0;
                    TextBox {
                        bbox: [*x, 100.0, x + w, 100.0, x + w, 120.0, *x, 120.0],
                        text: text.to_string(),
                        confidence: 0.9,
                    }
                })
                .collect();
            Ok(OcrResult {
                boxes,
                processing_time_ms: 0,
                image_size: (image.width(), image.height()),
            })
        }
    }

    fn offline_config() -> PricelistConfig {
        let mut config = PricelistConfig::default();
        config.ocr.model_dir = std::path::PathBuf::from("/nonexistent/pricelist-models");
        config
    }

    #[test]
    fn test_strategy_lists() {
        let config = offline_config();
        let glen = VendorParser::for_code("glen_rose");
        let rw = VendorParser::for_code("rw_zant");

        let without_ai = ExtractionPipeline::new(&config);
        assert_eq!(without_ai.strategies_for(&glen), vec![Strategy::ImageOcr]);
        assert_eq!(without_ai.strategies_for(&rw), vec![Strategy::StructuredText, Strategy::ImageOcr]);

        let with_ai = ExtractionPipeline::new(&config).with_model(Box::new(Canned("")));
        assert_eq!(with_ai.strategies_for(&glen), vec![Strategy::Ai, Strategy::ImageOcr]);
    }

    #[test]
    fn test_ai_first_for_preferred_vendor() {
        let pipeline = ExtractionPipeline::new(&offline_config()).with_model(Box::new(Canned(
            "Product ID,Product Description,Cost\n711000005-01,CHUCK ROLL,$5.99/LB\n",
        )));
        let job = DocumentJob::new("Glen Rose 2024.pdf", "glen_rose", b"%PDF-1.5".to_vec());
        let items = pipeline.process(&job).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id.as_str(), "711000005-01");
    }

    #[test]
    fn test_all_strategies_failed_is_reported() {
        let pipeline = ExtractionPipeline::new(&offline_config()).with_model(Box::new(Canned("")));
        let job = DocumentJob::new("glen_rose.pdf", "glen_rose", b"not a pdf".to_vec());

        match pipeline.process(&job) {
            Err(ExtractionError::AllStrategiesFailed { document, attempts }) => {
                assert_eq!(document, "glen_rose.pdf");
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("ai strategy failed"));
                assert!(attempts[1].starts_with("image_ocr strategy failed"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_ocr_fallback_on_text_only_pdf() {
        let renderer = Arc::new(WhitePage::default());
        let pipeline = ExtractionPipeline::new(&offline_config())
            .with_model(Box::new(Canned("")))
            .with_ocr_backend(Box::new(CannedOcr(vec![
                (10.0, "711000005-01"),
                (170.0, "CHUCK ROLL"),
                (320.0, "$5.99/LB"),
            ])))
            .with_page_renderer(renderer.clone());

        let job = DocumentJob::new("glen_rose.pdf", "glen_rose", price_sheet());
        let items = pipeline.process(&job).unwrap();

        assert_eq!(renderer.rendered.load(Ordering::SeqCst), 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id.as_str(), "711000005-01");
        assert_eq!(items[0].description, "CHUCK ROLL");
        assert_eq!(items[0].cost.to_string(), "$5.99/LB");
    }
}
