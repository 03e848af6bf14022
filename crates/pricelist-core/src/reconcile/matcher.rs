//! Deterministic identifier matching with AI-assisted fallback.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::normalize::{has_extra_suffix, normalize};
use crate::ai::{strip_code_fences, GenerativeModel};
use crate::models::config::MatchingConfig;
use crate::models::line_item::LineItem;
use crate::models::matching::{CatalogEntry, MatchResult, MatchSummary, MatchedRecord, NO_MATCH};

lazy_static! {
    static ref MATCHED_ID_FIELD: Regex = Regex::new(r#""matched_id"\s*:\s*"([^"]+)""#).unwrap();
}

const PREFERRED_BRAND: &str = "KRUSE";
const GENERIC_DISTRIBUTOR: &str = "CG";

/// Literal id pairs that always win or always defer.
const PREFERRED_OVER_GENERIC: (&str, &str) = ("KRUSE01", "CG00001");
const NEVER_AUTO_RESOLVED: (&str, &str) = ("KRUSE5", "KRUSE05");

/// Switches for a matching run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Never consult the AI.
    pub use_id_only: bool,
    /// Send absent or short ambiguous ids to the AI.
    pub use_ai_fallback: bool,
    /// Send every record to the AI, bypassing identifier matching.
    /// `use_id_only` takes precedence.
    pub use_ai_only: bool,
}

impl MatchOptions {
    /// Identifier-only matching, the AI never consulted.
    pub fn id_only() -> Self {
        Self {
            use_id_only: true,
            ..Self::default()
        }
    }

    /// Every record matched by the AI.
    pub fn ai_only() -> Self {
        Self {
            use_ai_only: true,
            ..Self::default()
        }
    }

    fn ai_allowed(self) -> bool {
        self.use_ai_fallback && !self.use_id_only
    }

    fn routes_all_to_ai(self) -> bool {
        self.use_ai_only && !self.use_id_only
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            use_id_only: false,
            use_ai_fallback: true,
            use_ai_only: false,
        }
    }
}

impl From<&MatchingConfig> for MatchOptions {
    fn from(config: &MatchingConfig) -> Self {
        Self {
            use_id_only: config.use_id_only,
            use_ai_fallback: config.use_ai_fallback,
            use_ai_only: config.use_ai_only,
        }
    }
}

/// Tie-break outcome over several candidates.
enum Simplest<'a> {
    Winner(&'a CatalogEntry),
    Undecided,
}

/// Matches extracted records against a catalog.
pub struct Reconciler<'c> {
    catalog: &'c Catalog,
    model: Option<Box<dyn GenerativeModel>>,
    candidate_cap: usize,
    confidence_threshold: f32,
}

impl<'c> Reconciler<'c> {
    pub fn new(catalog: &'c Catalog, config: &MatchingConfig) -> Self {
        Self {
            catalog,
            model: None,
            candidate_cap: config.candidate_cap.max(1),
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn with_model(mut self, model: Box<dyn GenerativeModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Match one record. Never fails; every problem becomes a `NO_MATCH` reasoning.
    pub fn match_item(&self, item: &LineItem, options: MatchOptions) -> MatchResult {
        let result = if options.routes_all_to_ai() {
            self.match_with_ai(item, self.catalog.entries())
        } else {
            self.match_by_id(item, options)
        };
        debug!(
            product_id = %item.product_id,
            matched_id = %result.matched_id,
            confidence = ?result.confidence,
            "matched record"
        );
        result
    }

    /// Identifier-first matching, deferring to the AI where ids cannot decide.
    pub fn match_by_id(&self, item: &LineItem, options: MatchOptions) -> MatchResult {
        if self.catalog.is_empty() {
            return MatchResult::no_match(Some(0.0), "Reference database is empty");
        }

        let raw_id = item.product_id.as_str();
        let token = normalize(raw_id);

        if token.is_empty() || item.product_id.is_absent() {
            if options.ai_allowed() {
                debug!(product_id = raw_id, "identifier missing, matching by description");
                return self.match_with_ai(item, self.catalog.entries());
            }
            return MatchResult::no_match(
                Some(0.0),
                format!("Invalid extracted product ID: {raw_id} (AI fallback disabled)"),
            );
        }

        let with_default_variant = format!("{token}-01");
        let candidates: Vec<&CatalogEntry> = self
            .catalog
            .normalized_entries()
            .filter(|(_, n)| *n == token || *n == with_default_variant)
            .map(|(e, _)| e)
            .collect();

        match candidates.as_slice() {
            [] => MatchResult::no_match(
                Some(0.0),
                format!("No match found for normalized ID: {token} (from {raw_id})"),
            ),
            [only] => MatchResult::matched(
                only,
                Some(1.0),
                format!("ID match: {raw_id} -> {} (normalized: {token})", only.canonical_id),
            ),
            _ => self.resolve_ambiguous(item, &token, &candidates, options),
        }
    }

    fn resolve_ambiguous(
        &self,
        item: &LineItem,
        token: &str,
        candidates: &[&CatalogEntry],
        options: MatchOptions,
    ) -> MatchResult {
        let raw_id = item.product_id.as_str();

        if let Simplest::Winner(entry) = select_simplest(candidates) {
            return MatchResult::matched(
                entry,
                Some(1.0),
                format!("ID match (simplest): {raw_id} -> {} (normalized: {token})", entry.canonical_id),
            );
        }

        let short = token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit());
        if short && options.ai_allowed() {
            info!(
                product_id = raw_id,
                candidates = candidates.len(),
                "ambiguous short identifier, asking the model"
            );
            let owned: Vec<CatalogEntry> = candidates.iter().map(|e| (*e).clone()).collect();
            return self.match_with_ai(item, &owned);
        }

        let first = candidates[0];
        MatchResult::matched(
            first,
            Some(0.9),
            format!(
                "ID match (multiple candidates): {raw_id} -> {} (normalized: {token})",
                first.canonical_id
            ),
        )
    }

    /// Ask the model to pick among `candidates` using id and description.
    ///
    /// Only the first `candidate_cap` entries are offered.
    pub fn match_with_ai(&self, item: &LineItem, candidates: &[CatalogEntry]) -> MatchResult {
        if candidates.is_empty() {
            return MatchResult::no_match(None, "Reference database is empty");
        }
        let Some(model) = self.model.as_ref() else {
            return MatchResult::no_match(None, "Error calling AI service: no generative model configured");
        };

        let offered = &candidates[..candidates.len().min(self.candidate_cap)];
        let prompt = build_matching_prompt(item, offered, self.confidence_threshold);

        match model.generate(&prompt, None) {
            Ok(text) => parse_matching_response(&text, offered),
            Err(e) => {
                warn!(product_id = %item.product_id, error = %e, "AI matching call failed");
                MatchResult::no_match(None, format!("Error calling AI service: {e}"))
            }
        }
    }

    /// Match records in order, one at a time.
    pub fn match_batch(&self, items: &[LineItem], options: MatchOptions) -> (Vec<MatchedRecord>, MatchSummary) {
        let records: Vec<MatchedRecord> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                debug!(index = i + 1, total = items.len(), product_id = %item.product_id, "matching record");
                MatchedRecord {
                    item: item.clone(),
                    result: self.match_item(item, options),
                }
            })
            .collect();

        let summary = MatchSummary::from_results(records.iter().map(|r| &r.result));
        info!(
            total = summary.total,
            matched = summary.matched,
            unmatched = summary.unmatched,
            "matching finished"
        );
        (records, summary)
    }
}

/// Score for the simplicity tie-break; lower is simpler.
fn simplicity_key(entry: &CatalogEntry) -> (bool, bool, usize, String) {
    let id = entry.canonical_id.to_uppercase();
    (has_extra_suffix(&id), !id.starts_with(PREFERRED_BRAND), id.len(), id)
}

fn select_simplest<'a>(candidates: &[&'a CatalogEntry]) -> Simplest<'a> {
    let upper: Vec<String> = candidates.iter().map(|e| e.canonical_id.to_uppercase()).collect();
    let has = |id: &str| upper.iter().any(|u| u == id);

    let (preferred, generic) = PREFERRED_OVER_GENERIC;
    if has(preferred) && has(generic) {
        if let Some(i) = upper.iter().position(|u| u == preferred) {
            return Simplest::Winner(candidates[i]);
        }
    }

    let brand: Vec<usize> = (0..upper.len()).filter(|&i| upper[i].starts_with(PREFERRED_BRAND)).collect();
    let distributor = upper.iter().filter(|u| u.starts_with(GENERIC_DISTRIBUTOR)).count();
    if brand.len() == 1 && distributor > 0 && brand.len() + distributor == upper.len() {
        return Simplest::Winner(candidates[brand[0]]);
    }

    let (a, b) = NEVER_AUTO_RESOLVED;
    if has(a) && has(b) {
        return Simplest::Undecided;
    }

    let mut scored: Vec<(_, &CatalogEntry)> = candidates.iter().map(|e| (simplicity_key(e), *e)).collect();
    scored.sort_by(|x, y| x.0.cmp(&y.0));

    let plain = scored.iter().filter(|(key, _)| !key.0).count();
    match scored.first() {
        Some((key, entry)) if !key.0 && plain == 1 => Simplest::Winner(*entry),
        _ => Simplest::Undecided,
    }
}

fn build_matching_prompt(item: &LineItem, candidates: &[CatalogEntry], threshold: f32) -> String {
    let reference: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. ID: {} | Description: {}", i + 1, e.canonical_id, e.description))
        .collect();
    let percent = (threshold * 100.0).round() as u32;

    format!(
        r#"You match one extracted price list product against a reference catalog.

EXTRACTED PRODUCT:
- Product ID: {id}
- Description: {description}

REFERENCE CATALOG ({count} products):
{reference}

RULES:
1. Use BOTH the product ID and the description.
2. If the product ID matches but the description names a different kind of product (for example CHICKEN BREAST versus BEEF BRISKET, or PORK versus FISH), answer NO_MATCH with confidence 0.0 and explain the conflict.
3. Product IDs may differ by prefixes (TYS-Z75880 and Z75880), suffixes (Z75880-CS and Z75880) or separators (Z-75880 and Z75880).
4. Descriptions may differ in word order, brand or packing words, abbreviations and case.
5. Only match when you are at least {percent}% confident. Otherwise answer NO_MATCH.
6. matched_id must be copied exactly from the reference catalog.

Answer with a single JSON object and nothing else:
{{"matched_id": "<catalog ID or {NO_MATCH}>", "confidence": 0.95, "reasoning": "<short explanation>"}}"#,
        id = item.product_id,
        description = item.description,
        count = candidates.len(),
        reference = reference.join("\n"),
    )
}

#[derive(Deserialize)]
struct MatchingAnswer {
    #[serde(default)]
    matched_id: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn confidence_value(value: Option<Value>) -> Option<f32> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(number.clamp(0.0, 1.0) as f32)
}

/// Interpret the model's answer against the ids it was offered.
fn parse_matching_response(text: &str, offered: &[CatalogEntry]) -> MatchResult {
    let cleaned = strip_code_fences(text);
    let lookup = |id: &str| offered.iter().find(|e| e.canonical_id == id);

    match serde_json::from_str::<MatchingAnswer>(cleaned.trim()) {
        Ok(answer) => {
            let matched_id = answer.matched_id.unwrap_or_else(|| NO_MATCH.to_string());
            let confidence = confidence_value(answer.confidence);
            let reasoning = answer.reasoning.unwrap_or_else(|| "No reasoning provided".to_string());

            if matched_id == NO_MATCH {
                return MatchResult::no_match(confidence, reasoning);
            }
            match lookup(&matched_id) {
                Some(entry) => MatchResult::matched(entry, confidence, reasoning),
                None => MatchResult::no_match(
                    confidence,
                    format!("Model returned unknown catalog ID {matched_id}: {reasoning}"),
                ),
            }
        }
        Err(e) => {
            let recovered = MATCHED_ID_FIELD.captures(text).map(|c| c[1].to_string());
            match recovered {
                Some(id) if id == NO_MATCH => MatchResult::no_match(None, "Parsed from malformed JSON"),
                Some(id) => match lookup(&id) {
                    Some(entry) => MatchResult::matched(entry, None, "Parsed from malformed JSON"),
                    None => MatchResult::no_match(
                        None,
                        format!("Parsed from malformed JSON, unknown catalog ID {id}"),
                    ),
                },
                None => MatchResult::no_match(None, format!("Failed to parse AI response: {e}")),
            }
        }
    }
}
