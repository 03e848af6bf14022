//! Merging extracted rows: identifier uniqueness and price variants.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::models::line_item::{CostValue, LineItem, ProductId};
use crate::vendor::patterns::WHITESPACE;

lazy_static! {
    static ref CASE_LABEL: Regex = Regex::new(r"(?i)[-/(]?\s*\b(?:CASE|CS)\b\)?").unwrap();
    static ref PALLET_LABEL: Regex = Regex::new(r"(?i)[-/(]?\s*\b(?:PALLET|PLT)\b\)?").unwrap();
}

/// Collects rows for one document, keeping the first row per identifier.
///
/// Absent identifiers never collide: every `N/A` row is kept.
#[derive(Debug, Default)]
pub struct Aggregator {
    seen: HashSet<String>,
    items: Vec<LineItem>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row; returns `false` when an earlier row already holds its id.
    pub fn push(&mut self, item: LineItem) -> bool {
        if let ProductId::Present(id) = &item.product_id {
            if !self.seen.insert(id.clone()) {
                return false;
            }
        }
        self.items.push(item);
        true
    }

    /// Add rows in order, returning how many were kept.
    pub fn extend(&mut self, items: impl IntoIterator<Item = LineItem>) -> usize {
        items.into_iter().filter(|item| self.push(item.clone())).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }
}

/// Drop rows identical in all three fields, keeping first occurrences.
///
/// Rows sharing an id but differing in description or cost are price
/// variants and survive for [`restructure_price_variants`].
pub fn dedup_exact(items: Vec<LineItem>) -> Vec<LineItem> {
    let mut seen: HashSet<LineItem> = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

/// One export row with case and pallet prices side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceVariantRow {
    pub product_id: ProductId,
    pub description: String,
    pub case_price: Option<CostValue>,
    pub pallet_price: Option<CostValue>,
}

enum PriceLabel {
    Case,
    Pallet,
    Unlabeled,
}

fn label_of(description: &str) -> PriceLabel {
    if CASE_LABEL.is_match(description) {
        PriceLabel::Case
    } else if PALLET_LABEL.is_match(description) {
        PriceLabel::Pallet
    } else {
        PriceLabel::Unlabeled
    }
}

fn strip_label(description: &str, label: &Regex) -> String {
    let stripped = label.replace_all(description, " ");
    WHITESPACE
        .replace_all(stripped.trim(), " ")
        .trim_matches(|c: char| c == '-' || c == '/' || c.is_whitespace())
        .to_string()
}

/// Fold rows sharing an identifier into case/pallet price pairs.
///
/// Groups keep first-appearance order. A CASE/CS description fills the case
/// price and a PALLET/PLT description the pallet price. Unlabeled rows fill
/// the case slot first, then the pallet slot; rows beyond that are dropped.
pub fn restructure_price_variants(items: &[LineItem]) -> Vec<PriceVariantRow> {
    let mut order: Vec<Vec<&LineItem>> = Vec::new();
    let mut index: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for item in items {
        match &item.product_id {
            ProductId::Present(id) => match index.get(id.as_str()) {
                Some(&i) => order[i].push(item),
                None => {
                    index.insert(id.as_str(), order.len());
                    order.push(vec![item]);
                }
            },
            ProductId::Absent => order.push(vec![item]),
        }
    }

    order.into_iter().map(merge_group).collect()
}

fn merge_group(group: Vec<&LineItem>) -> PriceVariantRow {
    let first = group[0];
    let mut row = PriceVariantRow {
        product_id: first.product_id.clone(),
        description: String::new(),
        case_price: None,
        pallet_price: None,
    };

    if group.len() == 1 {
        row.description = first.description.clone();
        row.case_price = Some(first.cost.clone());
        return row;
    }

    for item in &group {
        match label_of(&item.description) {
            PriceLabel::Case => {
                row.case_price = Some(item.cost.clone());
                if row.description.is_empty() {
                    row.description = strip_label(&item.description, &CASE_LABEL);
                }
            }
            PriceLabel::Pallet => {
                row.pallet_price = Some(item.cost.clone());
                if row.description.is_empty() {
                    row.description = strip_label(&item.description, &PALLET_LABEL);
                }
            }
            PriceLabel::Unlabeled => {
                if row.case_price.is_none() {
                    row.case_price = Some(item.cost.clone());
                    if row.description.is_empty() {
                        row.description = item.description.clone();
                    }
                } else if row.pallet_price.is_none() {
                    row.pallet_price = Some(item.cost.clone());
                }
            }
        }
    }

    if row.description.is_empty() {
        row.description = first.description.clone();
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(id: &str, desc: &str, cost: &str) -> LineItem {
        LineItem::new(ProductId::new(id), desc, cost.parse().unwrap())
    }

    #[test]
    fn test_first_wins_and_absent_ids_kept() {
        let mut agg = Aggregator::new();
        assert!(agg.push(item("103387", "BEEF CHUCK", "$4.99")));
        assert!(!agg.push(item("103387", "BEEF CHUCK LATER", "$5.99")));
        assert!(agg.push(item("N/A", "BEEF LIVER", "$3.49")));
        assert!(agg.push(item("N/A", "PORK LIVER", "$2.49")));
        assert_eq!(agg.len(), 3);

        let items = agg.into_items();
        assert_eq!(items[0].description, "BEEF CHUCK");
    }

    #[test]
    fn test_dedup_exact_keeps_variants() {
        let items = vec![
            item("711000005-01", "CHUCK ROLL - Small", "$5.99/LB"),
            item("711000005-01", "CHUCK ROLL - Large", "$6.20/LB"),
            item("711000005-01", "CHUCK ROLL - Small", "$5.99/LB"),
        ];
        assert_eq!(dedup_exact(items).len(), 2);
    }

    #[test]
    fn test_restructure_labeled() {
        let items = vec![
            item("330020-61", "GROUND BEEF 80/20 - PALLET", "$3.10"),
            item("330020-61", "GROUND BEEF 80/20 - CASE", "$3.40"),
            item("330021-61", "GROUND BEEF 73/27", "$2.90"),
        ];
        let rows = restructure_price_variants(&items);
        assert_eq!(
            rows,
            vec![
                PriceVariantRow {
                    product_id: ProductId::new("330020-61"),
                    description: "GROUND BEEF 80/20".to_string(),
                    case_price: Some("$3.40".parse().unwrap()),
                    pallet_price: Some("$3.10".parse().unwrap()),
                },
                PriceVariantRow {
                    product_id: ProductId::new("330021-61"),
                    description: "GROUND BEEF 73/27".to_string(),
                    case_price: Some("$2.90".parse().unwrap()),
                    pallet_price: None,
                },
            ]
        );
    }

    #[test]
    fn test_restructure_unlabeled_row_order() {
        let items = vec![
            item("12", "CHUCK ROLL", "1.85"),
            item("N/A", "BEEF LIVER", "$3.49"),
            item("12", "CHUCK ROLL BULK", "1.75"),
            item("12", "CHUCK ROLL EXTRA", "1.65"),
        ];
        let rows = restructure_price_variants(&items);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "CHUCK ROLL");
        assert_eq!(rows[0].case_price, Some("1.85".parse().unwrap()));
        assert_eq!(rows[0].pallet_price, Some("1.75".parse().unwrap()));
        assert!(rows[1].product_id.is_absent());
    }

    #[test]
    fn test_label_words_not_substrings() {
        assert!(matches!(label_of("SNACKS ASSORTED"), PriceLabel::Unlabeled));
        assert!(matches!(label_of("WINGS 40# CS"), PriceLabel::Case));
        assert!(matches!(label_of("WINGS/PLT"), PriceLabel::Pallet));
    }
}
