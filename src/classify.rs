//! Query classification.
//!
//! Decides whether a query is a national ID or a student code, and which
//! storage partition (year) the code points at.
//!
//! # Rules
//!
//! Applied to the trimmed, lower-cased query, in this order:
//!
//! | Rule | Pattern | Result |
//! |------|---------|--------|
//! | 1 | `^[0-9]{8}$` | `NationalId`, no partition hint |
//! | 2 | `^20(0[7-9]\|1[0-6])` | `Code`, hint = the four-digit year |
//! | 3 | `^(1[7-9]\|2[0-5])` | `Code`, hint = `2000 +` the two digits |
//! | 4 | anything else | `Code`, no hint (search every partition) |
//!
//! The full-year rule is checked before the abbreviated one, so `"2015001"`
//! maps to 2015 while `"2017001"` falls through to rule 3 and maps to 2020.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ClassifiedQuery, PartitionId, QueryKind, FIRST_PARTITION, LAST_PARTITION};

static NATIONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8}$").expect("valid national id pattern"));

static FULL_YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^20(0[7-9]|1[0-6])").expect("valid full year pattern"));

static SHORT_YEAR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(1[7-9]|2[0-5])").expect("valid short year pattern"));

/// Classify a raw query.
///
/// Never fails: anything that is not exactly eight digits is a `Code`.
/// Callers reject blank queries before getting here.
pub fn classify(raw: &str) -> ClassifiedQuery {
    let raw = raw.trim().to_string();
    let lowered = raw.to_lowercase();

    if NATIONAL_ID.is_match(&lowered) {
        return ClassifiedQuery {
            raw,
            lowered,
            kind: QueryKind::NationalId,
            partition_hint: None,
        };
    }

    let partition_hint = partition_hint(&lowered);
    ClassifiedQuery {
        raw,
        lowered,
        kind: QueryKind::Code,
        partition_hint,
    }
}

/// Derive the partition a code points at from its prefix.
pub fn partition_hint(lowered: &str) -> Option<PartitionId> {
    if let Some(m) = FULL_YEAR_PREFIX.find(lowered) {
        return m.as_str().parse().ok();
    }
    SHORT_YEAR_PREFIX
        .find(lowered)
        .and_then(|m| m.as_str().parse::<PartitionId>().ok())
        .map(|short| 2000 + short)
}

/// Partitions to probe, in search order.
pub fn partitions_for(hint: Option<PartitionId>) -> Vec<PartitionId> {
    match hint {
        Some(year) => vec![year],
        None => (FIRST_PARTITION..=LAST_PARTITION).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_digits_is_national_id() {
        let q = classify("12345678");
        assert_eq!(q.kind, QueryKind::NationalId);
        assert_eq!(q.partition_hint, None);
        assert_eq!(q.raw, "12345678");
    }

    #[test]
    fn test_national_id_is_trimmed() {
        let q = classify("  87654321\t");
        assert_eq!(q.kind, QueryKind::NationalId);
        assert_eq!(q.raw, "87654321");
    }

    #[test]
    fn test_other_digit_lengths_are_codes() {
        assert_eq!(classify("1234567").kind, QueryKind::Code);
        assert_eq!(classify("123456789").kind, QueryKind::Code);
        assert_eq!(classify("1234567a").kind, QueryKind::Code);
    }

    #[test]
    fn test_non_ascii_digits_are_codes() {
        // Arabic-Indic digits are `\d` in Unicode but not a national ID.
        assert_eq!(classify("١٢٣٤٥٦٧٨").kind, QueryKind::Code);
    }

    #[test]
    fn test_full_year_prefix() {
        assert_eq!(classify("2010xyz").partition_hint, Some(2010));
        assert_eq!(classify("2007").partition_hint, Some(2007));
        assert_eq!(classify("2016ABC").partition_hint, Some(2016));
        assert_eq!(classify("2015001").partition_hint, Some(2015));
    }

    #[test]
    fn test_short_year_prefix() {
        assert_eq!(classify("17xyz").partition_hint, Some(2017));
        assert_eq!(classify("25").partition_hint, Some(2025));
        assert_eq!(classify("19100342").partition_hint, None); // 8 digits: national id
        assert_eq!(classify("1910034a").partition_hint, Some(2019));
    }

    #[test]
    fn test_full_year_checked_before_short_year() {
        // 2017 is outside the full-year range, so the first two digits win.
        assert_eq!(classify("2017001").partition_hint, Some(2020));
        assert_eq!(classify("2006abc").partition_hint, Some(2020));
    }

    #[test]
    fn test_no_hint() {
        assert_eq!(classify("99xyz").partition_hint, None);
        assert_eq!(classify("16abc").partition_hint, None);
        assert_eq!(classify("abc2015").partition_hint, None);
    }

    #[test]
    fn test_lowercases_for_matching() {
        let q = classify(" AbC-17 ");
        assert_eq!(q.raw, "AbC-17");
        assert_eq!(q.lowered, "abc-17");
    }

    #[test]
    fn test_partitions_for_hint() {
        assert_eq!(partitions_for(Some(2015)), vec![2015]);
    }

    #[test]
    fn test_partitions_for_full_range_is_ascending() {
        let all = partitions_for(None);
        assert_eq!(all.len(), 19);
        assert_eq!(all.first(), Some(&2007));
        assert_eq!(all.last(), Some(&2025));
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }
}
