//! Extraction delegated to a generative model under a CSV output contract.

use csv::{ReaderBuilder, Trim};
use tracing::{debug, warn};

use super::aggregate::dedup_exact;
use super::{Extractor, SourceDocument, Strategy};
use crate::ai::{strip_code_fences, Attachment, GenerativeModel};
use crate::models::line_item::LineItem;
use crate::vendor::{VendorParser, VendorProfile};

/// Header the model is told to emit.
pub const CSV_HEADER: &str = "Product ID,Product Description,Cost";

/// Instruction sent alongside the document.
pub fn build_prompt(profile: &VendorProfile) -> String {
    let vendor = if profile.name.is_empty() { "the vendor" } else { profile.name };
    format!(
        "You are extracting a price list from a {vendor} PDF. Extract EVERY product row from EVERY page.

Rules:
1. Product ID format: {hint}. If a row has no product ID, write N/A.
2. Keep rows whose price reads OUT or QUOTE; write the word as the cost.
3. Keep per-unit markers on the cost exactly as printed: /LB, /CS, /EA.
4. When one product lists several prices (sizes, case and pallet), output one row per price and append the variation to the description.
5. Quote any field containing a comma.

Return ONLY CSV with exactly this header line:
{CSV_HEADER}
Do not add explanations, notes or markdown.",
        hint = profile.id_hint,
    )
}

/// Parse the model's CSV answer into validated line items.
///
/// Rows that fail the vendor's rules are dropped with a warning.
pub fn parse_csv_response(text: &str, parser: &VendorParser) -> Vec<LineItem> {
    let body = strip_code_fences(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body.as_bytes());

    let mut items = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(row = index + 1, error = %e, "unreadable CSV row from model");
                continue;
            }
        };
        if index == 0 && record.iter().any(|f| f.to_lowercase().contains("product")) {
            continue;
        }
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() < 3 {
            warn!(row = index + 1, fields = record.len(), "model row has fewer than three fields");
            continue;
        }

        match parser.try_parse_fields(&record[0], &record[1], &record[2]) {
            Ok(item) => items.push(item),
            Err(reason) => warn!(row = index + 1, %reason, id = &record[0], "model row rejected"),
        }
    }
    items
}

/// Sends the whole document to a generative model.
pub struct AiExtractor {
    model: Box<dyn GenerativeModel>,
}

impl AiExtractor {
    pub fn new(model: Box<dyn GenerativeModel>) -> Self {
        Self { model }
    }
}

impl Extractor for AiExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Ai
    }

    fn extract(&self, document: &SourceDocument<'_>, parser: &VendorParser) -> crate::Result<Vec<LineItem>> {
        let prompt = build_prompt(parser.profile());
        let response = self.model.generate(&prompt, Some(Attachment::pdf(document.bytes)))?;

        let parsed = parse_csv_response(&response, parser);
        let found = parsed.len();
        let items = dedup_exact(parsed);
        debug!(
            document = document.name,
            strategy = "ai",
            response_chars = response.len(),
            found,
            kept = items.len(),
            "model response parsed"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AiError;
    use crate::models::line_item::CostValue;
    use pretty_assertions::assert_eq;

    struct Canned(Result<String, ()>);

    impl GenerativeModel for Canned {
        fn generate(&self, _prompt: &str, attachment: Option<Attachment<'_>>) -> Result<String, AiError> {
            assert_eq!(attachment.map(|a| a.mime_type), Some("application/pdf"));
            self.0.clone().map_err(|_| AiError::EmptyResponse)
        }
    }

    #[test]
    fn test_prompt_mentions_contract() {
        let prompt = build_prompt(crate::vendor::profile("glen_rose"));
        assert!(prompt.contains("Glen Rose Meat Company"));
        assert!(prompt.contains("711000005-01"));
        assert!(prompt.contains(CSV_HEADER));
        assert!(prompt.contains("N/A"));
    }

    #[test]
    fn test_parse_fenced_csv() {
        let text = "```csv\n\
            Product ID,Product Description,Cost\n\
            711000005-01,\"CHUCK ROLL, CHOICE - Small\",$5.99/LB\n\
            N/A,BEEF LIVER,OUT\n\
            711000006-01,12,$4.00\n\
            711000007-01,SHORT ROW\n\
            711000008-01,BRISKET,$99999.00\n\
            ```";
        let parser = VendorParser::for_code("glen_rose");
        let items = parse_csv_response(text, &parser);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id.as_str(), "711000005-01");
        assert_eq!(items[0].description, "CHUCK ROLL, CHOICE - Small");
        assert_eq!(items[0].cost.to_string(), "$5.99/LB");
        assert!(items[1].product_id.is_absent());
        assert_eq!(items[1].cost, CostValue::OutOfStock);
    }

    #[test]
    fn test_extract_drops_exact_duplicates_only() {
        let csv = "Product ID,Product Description,Cost\n\
            330020-61,GROUND BEEF - CASE,$3.40\n\
            330020-61,GROUND BEEF - PALLET,$3.10\n\
            330020-61,GROUND BEEF - CASE,$3.40\n";
        let extractor = AiExtractor::new(Box::new(Canned(Ok(csv.to_string()))));
        let document = SourceDocument::new("delmar_steer.pdf", b"%PDF-1.5");
        let items = extractor
            .extract(&document, &VendorParser::for_code("delmar_steer"))
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_service_error_propagates() {
        let extractor = AiExtractor::new(Box::new(Canned(Err(()))));
        let document = SourceDocument::new("cofoods.pdf", b"%PDF-1.5");
        assert!(extractor.extract(&document, &VendorParser::for_code("cofoods")).is_err());
    }
}
