//! Catalog entries and match results.

use serde::{Deserialize, Serialize};

use super::line_item::LineItem;

/// `matched_id` value for an unmatched record.
pub const NO_MATCH: &str = "NO_MATCH";

/// One row of the reference catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub canonical_id: String,
    pub description: String,
}

/// Outcome of matching one extracted record.
///
/// `matched_id` is either [`NO_MATCH`] or the id of a loaded catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched_id: String,
    /// `None` when the confidence is unknown.
    pub confidence: Option<f32>,
    pub reasoning: String,
    pub matched_description: Option<String>,
}

impl MatchResult {
    pub fn no_match(confidence: Option<f32>, reasoning: impl Into<String>) -> Self {
        Self {
            matched_id: NO_MATCH.to_string(),
            confidence,
            reasoning: reasoning.into(),
            matched_description: None,
        }
    }

    pub fn matched(entry: &CatalogEntry, confidence: Option<f32>, reasoning: impl Into<String>) -> Self {
        Self {
            matched_id: entry.canonical_id.clone(),
            confidence,
            reasoning: reasoning.into(),
            matched_description: Some(entry.description.clone()),
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_id != NO_MATCH
    }
}

/// An extracted record paired with its match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    #[serde(flatten)]
    pub item: LineItem,
    #[serde(rename = "match")]
    pub result: MatchResult,
}

/// Totals over a matching run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Mean over matched results whose confidence is known.
    pub avg_confidence: f32,
}

impl MatchSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a MatchResult>) -> Self {
        let mut summary = MatchSummary::default();
        let mut confidence_sum = 0.0f32;
        let mut confidence_count = 0usize;

        for result in results {
            summary.total += 1;
            if result.is_match() {
                summary.matched += 1;
                if let Some(c) = result.confidence {
                    confidence_sum += c;
                    confidence_count += 1;
                }
            } else {
                summary.unmatched += 1;
            }
        }

        if confidence_count > 0 {
            summary.avg_confidence = confidence_sum / confidence_count as f32;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary() {
        let entry = CatalogEntry {
            canonical_id: "156171".to_string(),
            description: "BEEF CHUCK".to_string(),
        };
        let results = vec![
            MatchResult::matched(&entry, Some(1.0), "ID match"),
            MatchResult::matched(&entry, Some(0.5), "AI match"),
            MatchResult::matched(&entry, None, "Parsed from malformed JSON"),
            MatchResult::no_match(Some(0.0), "nothing"),
        ];
        let summary = MatchSummary::from_results(&results);
        assert_eq!(
            summary,
            MatchSummary {
                total: 4,
                matched: 3,
                unmatched: 1,
                avg_confidence: 0.75,
            }
        );
    }
}
