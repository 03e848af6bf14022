//! Canonical comparison form of product identifiers.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::line_item::is_absent_marker;

lazy_static! {
    /// Sub-family numbered by offset from a base code: `K002013-01` is member 13.
    static ref FAMILY_OFFSET: Regex = Regex::new(r"^K002(\d{3})(-\d{2})[-A-Z]*$").unwrap();

    /// Numeric core followed by a two-digit variant suffix and optional letters.
    static ref CORE_WITH_SUFFIX: Regex = Regex::new(r"^.*?(\d+)(-\d{2})[A-Z]*$").unwrap();

    /// First numeric core.
    static ref CORE: Regex = Regex::new(r"^.*?(\d+)").unwrap();

    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();

    /// Extra characters after an otherwise complete identifier.
    static ref FAMILY_EXTRA_SUFFIX: Regex = Regex::new(r"^K002\d{3}-\d{2}[A-Z-]+").unwrap();
    static ref KRUSE_EXTRA_SUFFIX: Regex = Regex::new(r"^KRUSE\d+[A-Z-]+").unwrap();
}

fn strip_zeros(digits: &str) -> &str {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

/// Normalize an identifier for comparison.
///
/// Leading letters and zeros are dropped, a `-NN` variant suffix is kept, and
/// trailing letters are discarded. Absent or digit-free input gives `""`.
///
/// ```
/// use pricelist_core::reconcile::normalize;
///
/// assert_eq!(normalize("Z156171"), "156171");
/// assert_eq!(normalize("K002013-01"), "13-01");
/// assert_eq!(normalize("156171A"), "156171");
/// ```
pub fn normalize(raw_id: &str) -> String {
    let cleaned = raw_id.trim().to_uppercase();
    if is_absent_marker(&cleaned) {
        return String::new();
    }

    if let Some(caps) = FAMILY_OFFSET.captures(&cleaned) {
        return format!("{}{}", strip_zeros(&caps[1]), &caps[2]);
    }
    if let Some(caps) = CORE_WITH_SUFFIX.captures(&cleaned) {
        return format!("{}{}", strip_zeros(&caps[1]), &caps[2]);
    }
    if let Some(caps) = CORE.captures(&cleaned) {
        return strip_zeros(&caps[1]).to_string();
    }

    DIGIT_RUN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .max_by_key(|run| run.len())
        .map(|run| strip_zeros(run).to_string())
        .unwrap_or_default()
}

/// Whether a catalog id carries decoration beyond its family's base pattern.
pub(crate) fn has_extra_suffix(upper_id: &str) -> bool {
    FAMILY_EXTRA_SUFFIX.is_match(upper_id) || KRUSE_EXTRA_SUFFIX.is_match(upper_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_prefixes_and_zeros() {
        assert_eq!(normalize("Z156171"), "156171");
        assert_eq!(normalize("K156171"), "156171");
        assert_eq!(normalize("G0015050194"), "15050194");
        assert_eq!(normalize("TYS-Z75880"), "75880");
        assert_eq!(normalize("000"), "0");
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(normalize("156171-01"), "156171-01");
        assert_eq!(normalize("Z156171-01"), "156171-01");
        assert_eq!(normalize("G015050194-01"), "15050194-01");
        assert_eq!(normalize("156171A"), "156171");
        assert_eq!(normalize("Z156171B"), "156171");
        assert_eq!(normalize("156171-1"), "156171");
        assert_eq!(normalize("156171-123"), "156171");
    }

    #[test]
    fn test_family_offset() {
        assert_eq!(normalize("K002013-01"), "13-01");
        assert_eq!(normalize("K002019-01FZ"), "19-01");
        assert_eq!(normalize("K002019-01FZ-SABYS"), "19-01");
        assert_eq!(normalize("k002014-01"), "14-01");
    }

    #[test]
    fn test_absent_and_unrecognizable() {
        assert_eq!(normalize("N/A"), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("ABC"), "");
    }

    #[test]
    fn test_extra_suffix() {
        assert!(has_extra_suffix("K002019-01FZ"));
        assert!(!has_extra_suffix("K002019-01"));
        assert!(has_extra_suffix("KRUSE05-SP"));
        assert!(!has_extra_suffix("KRUSE05"));
    }
}
