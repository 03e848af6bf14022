//! Reference catalog loading.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info};

use super::normalize::normalize;
use crate::error::CatalogError;
use crate::models::matching::CatalogEntry;

const DESCRIPTION_HEADERS: &[&str] = &["product name", "product description", "description", "product_name"];
const ID_HEADERS: &[&str] = &["productcode", "product code", "product_code", "product id", "sku"];

/// Families that are never match targets.
const EXCLUDED_PREFIXES: &[&str] = &["ZTBD", "TEMPGLEN"];

/// Promotional variants end in `SP` (including `-SP`).
fn is_excluded(id: &str) -> bool {
    id.ends_with("SP") || EXCLUDED_PREFIXES.iter().any(|p| id.starts_with(p))
}

/// Loaded catalog with each entry's normalized id precomputed.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    normalized: Vec<String>,
}

impl Catalog {
    /// Build from entries, dropping excluded ids. May be empty.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let entries: Vec<CatalogEntry> = entries
            .into_iter()
            .filter(|e| !is_excluded(&e.canonical_id))
            .collect();
        let normalized = entries.iter().map(|e| normalize(&e.canonical_id)).collect();
        Self { entries, normalized }
    }

    /// Load from CSV with a header row naming the id and description columns.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?.clone();
        let desc_col = find_column(&headers, DESCRIPTION_HEADERS).ok_or(CatalogError::MissingColumn("description"))?;
        let id_col = find_column(&headers, ID_HEADERS).ok_or(CatalogError::MissingColumn("product code"))?;

        let mut rows = 0usize;
        let mut entries = Vec::new();
        for record in csv.records() {
            let record = record?;
            rows += 1;
            let (Some(id), Some(desc)) = (record.get(id_col), record.get(desc_col)) else {
                continue;
            };
            if id.is_empty() || desc.is_empty() {
                continue;
            }
            entries.push(CatalogEntry {
                canonical_id: id.to_string(),
                description: desc.to_string(),
            });
        }

        let catalog = Self::from_entries(entries);
        debug!(rows, kept = catalog.len(), "catalog rows read");
        if catalog.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(catalog)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|e| CatalogError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_csv_reader(file)?;
        info!(path = %path.display(), entries = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with their normalized ids, in catalog order.
    pub fn normalized_entries(&self) -> impl Iterator<Item = (&CatalogEntry, &str)> {
        self.entries.iter().zip(self.normalized.iter().map(String::as_str))
    }

    /// Entry with exactly this canonical id.
    pub fn get(&self, canonical_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.canonical_id == canonical_id)
    }
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const CSV: &str = "\
SKU,Product Name,Category
Z156171,GROUND BEEF 80/20,Beef
K002013-01,BEEF BRISKET,Beef
K002013-01SP,BEEF BRISKET PROMO,Beef
K002013-01-SP,BEEF BRISKET PROMO 2,Beef
ZTBD6,TO BE DETERMINED,Misc
TEMPGLEN1,TEMPORARY,Misc
,MISSING ID,Misc
";

    #[test]
    fn test_filters_and_aliases() {
        let catalog = Catalog::from_csv_reader(CSV.as_bytes()).unwrap();
        let ids: Vec<&str> = catalog.entries().iter().map(|e| e.canonical_id.as_str()).collect();
        assert_eq!(ids, vec!["Z156171", "K002013-01"]);

        let normalized: Vec<&str> = catalog.normalized_entries().map(|(_, n)| n).collect();
        assert_eq!(normalized, vec!["156171", "13-01"]);
        assert_eq!(catalog.get("Z156171").map(|e| e.description.as_str()), Some("GROUND BEEF 80/20"));
    }

    #[test]
    fn test_missing_column() {
        let err = Catalog::from_csv_reader("Code,Name\n1,A\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::MissingColumn("description")));
    }

    #[test]
    fn test_empty_after_filtering() {
        let err = Catalog::from_csv_reader("product id,description\nZTBD1,X\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::Empty));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        assert_eq!(Catalog::from_path(file.path()).unwrap().len(), 2);

        let missing = Catalog::from_path(Path::new("/nonexistent/catalog.csv")).unwrap_err();
        assert!(matches!(missing, CatalogError::Unavailable(_)));
    }
}
