//! Rows recovered from the document's embedded text layout.

use tracing::{debug, trace};

use super::aggregate::Aggregator;
use super::{Extractor, SourceDocument, Strategy};
use crate::models::config::PdfConfig;
use crate::models::line_item::LineItem;
use crate::pdf::layout::{group_lines, split_halves, table_rows};
use crate::pdf::{PdfExtractor, PdfProcessor, TextRun};
use crate::vendor::VendorParser;

/// Parses each page as two independent halves: table rows first, lines second.
pub struct StructuredTextExtractor {
    config: PdfConfig,
}

impl StructuredTextExtractor {
    pub fn new(config: PdfConfig) -> Self {
        Self { config }
    }

    /// Items from one half-page of positioned runs.
    fn parse_half(&self, runs: &[TextRun], parser: &VendorParser) -> Vec<LineItem> {
        let lines = group_lines(runs, self.config.line_tolerance);

        if let Some(rows) = table_rows(&lines) {
            let items: Vec<LineItem> = rows.iter().filter_map(|r| parser.parse_row(r)).collect();
            if !items.is_empty() {
                trace!(rows = rows.len(), items = items.len(), "table rows parsed");
                return items;
            }
        }

        lines.iter().filter_map(|l| parser.parse_line(&l.to_text())).collect()
    }

    fn page_items(&self, pdf: &PdfExtractor, page: u32, parser: &VendorParser) -> crate::Result<Vec<LineItem>> {
        let runs = pdf.text_runs(page)?;
        if runs.is_empty() {
            // Fonts the run walker cannot place still yield plain text.
            let text = pdf.extract_page_text(page)?;
            return Ok(text.lines().filter_map(|l| parser.parse_line(l)).collect());
        }

        let (width, _) = pdf.page_size(page)?;
        let (left, right) = split_halves(runs, width);
        let mut items = self.parse_half(&left, parser);
        items.extend(self.parse_half(&right, parser));
        Ok(items)
    }
}

impl Default for StructuredTextExtractor {
    fn default() -> Self {
        Self::new(PdfConfig::default())
    }
}

impl Extractor for StructuredTextExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::StructuredText
    }

    fn extract(&self, document: &SourceDocument<'_>, parser: &VendorParser) -> crate::Result<Vec<LineItem>> {
        let pdf = PdfExtractor::from_bytes(document.bytes)?;
        let mut pages = pdf.page_count();
        if self.config.max_pages > 0 {
            pages = pages.min(self.config.max_pages as u32);
        }

        let mut aggregator = Aggregator::new();
        for page in 1..=pages {
            let items = self.page_items(&pdf, page, parser)?;
            let found = items.len();
            let kept = aggregator.extend(items);
            debug!(document = document.name, strategy = "structured_text", page, found, kept, "page parsed");
        }

        Ok(aggregator.into_items())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use pretty_assertions::assert_eq;

    fn show(x: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(10)]),
            Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    /// Text-only page in two halves; no raster content anywhere.
    pub(crate) fn price_sheet() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut operations = Vec::new();
        // Left half.
        operations.extend(show(40, 700, "103387"));
        operations.extend(show(100, 700, "BEEF CHUCK ROLL"));
        operations.extend(show(250, 700, "$4.99"));
        operations.extend(show(40, 680, "103388"));
        operations.extend(show(100, 680, "PORK BELLY"));
        operations.extend(show(250, 680, "$3.49"));
        // Right half, repeating one id.
        operations.extend(show(340, 700, "103387"));
        operations.extend(show(400, 700, "BEEF CHUCK LATER"));
        operations.extend(show(540, 700, "$5.99"));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_halves_parsed_and_deduplicated() {
        let bytes = price_sheet();
        let document = SourceDocument::new("rw_zant.pdf", &bytes);
        let parser = VendorParser::for_code("rw_zant");

        let items = StructuredTextExtractor::default().extract(&document, &parser).unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["103387", "103388"]);
        assert_eq!(items[0].description, "BEEF CHUCK ROLL");
        assert_eq!(items[0].cost.to_string(), "$4.99");
    }

    #[test]
    fn test_not_a_pdf() {
        let document = SourceDocument::new("broken.pdf", b"not a pdf");
        let parser = VendorParser::for_code("rw_zant");
        assert!(StructuredTextExtractor::default().extract(&document, &parser).is_err());
    }
}
