//! Stage-1.5 metadata cleaning (§3 "Stage1.5"): normalizes the publisher
//! number and publication year extracted in Stage 1, flagging whether
//! either was actually rewritten.

use once_cell::sync::Lazy;
use regex::Regex;

use mediacat_store::{Stage1HalfRecord, Stage1Record};

use crate::year::extract_year;

static HAS_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]").expect("valid regex"));
static DIGIT_SPACE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").expect("valid regex"));
static UT_BARCODE_15: Lazy<Regex> = Lazy::new(|| Regex::new(r"^05917\d{10}$").expect("valid regex"));
static STATE_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b[A-Z]{2}\s+\d{5}").expect("valid regex"));
static ADDRESS_WORDS: &[&str] = &[
    "road", "street", "ave", "avenue", "blvd", "boulevard", "drive", "lane", "way", "place", "court",
];

/// Removes dashes from alphanumeric catalog numbers; removes spaces and
/// dashes from purely numeric codes. Mirrors the source pipeline's
/// `clean_number`.
fn clean_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if HAS_LETTER.is_match(trimmed) {
        trimmed.replace('-', "")
    } else {
        DIGIT_SPACE_DASH.replace_all(trimmed, "").to_string()
    }
}

/// A cleaned number is kept only if it looks like a real UPC/EAN/ISBN or
/// catalog number rather than a library barcode sticker or a stray address
/// fragment captured alongside the publisher block.
fn is_plausible_number(cleaned: &str) -> bool {
    let digits_only: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    let all_digits = !digits_only.is_empty() && digits_only.chars().all(|c| c.is_ascii_digit());

    if all_digits && (digits_only.len() == 10 || UT_BARCODE_15.is_match(&digits_only)) {
        return false;
    }

    if HAS_LETTER.is_match(cleaned) {
        let lowered = cleaned.to_lowercase();
        if ADDRESS_WORDS.iter().any(|w| lowered.contains(w)) {
            return false;
        }
        if STATE_ZIP.is_match(cleaned) {
            return false;
        }
        return (3..=20).contains(&cleaned.trim().len());
    }

    if all_digits {
        return matches!(digits_only.len(), 12 | 13);
    }

    false
}

/// Cleans and validates every number attached to an Item's publishers,
/// returning the joined list of survivors and whether any number was
/// actually rewritten by cleaning (as opposed to merely dropped for being
/// implausible, which does not count as an edit).
fn normalize_publisher_numbers(publishers: &[mediacat_store::Publisher]) -> (Option<String>, bool) {
    let mut survivors = Vec::new();
    let mut edited = false;

    for publisher in publishers {
        for raw in &publisher.numbers {
            let cleaned = clean_number(raw);
            if cleaned != raw.trim() {
                edited = true;
            }
            if is_plausible_number(&cleaned) {
                survivors.push(cleaned);
            }
        }
    }

    if survivors.is_empty() {
        (None, edited)
    } else {
        (Some(survivors.join(", ")), edited)
    }
}

/// Normalizes the publication date down to a bare year, flagging whether
/// the original text carried anything beyond a year (month/day components,
/// copyright/phonogram symbols) that had to be stripped or discarded.
fn normalize_date(raw: &str) -> (Option<i32>, bool) {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("not visible") {
        return (None, false);
    }
    let year = extract_year(trimmed);
    let is_bare_year = trimmed.chars().all(|c| c.is_ascii_digit()) && trimmed.len() == 4;
    (year, !is_bare_year)
}

/// Produces the Stage-1.5 record from a Stage-1 record.
pub fn clean(stage1: &Stage1Record) -> Stage1HalfRecord {
    let (normalized_publisher_number, numbers_edited) = normalize_publisher_numbers(&stage1.publishers);
    let (normalized_year, date_edited) = stage1
        .publication_date
        .as_deref()
        .map(normalize_date)
        .unwrap_or((None, false));

    Stage1HalfRecord {
        numbers_edited,
        date_edited,
        normalized_publisher_number,
        normalized_year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_store::Publisher;

    fn publisher(numbers: &[&str]) -> Publisher {
        Publisher {
            name: None,
            place: None,
            numbers: numbers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn strips_dashes_from_catalog_numbers() {
        assert_eq!(clean_number("SD-1234-A"), "SD1234A");
    }

    #[test]
    fn strips_spaces_and_dashes_from_numeric_codes() {
        assert_eq!(clean_number("123 456-789"), "123456789");
    }

    #[test]
    fn drops_ut_library_barcode_stickers() {
        let (normalized, edited) = normalize_publisher_numbers(&[publisher(&["0591712345678901"])]);
        assert_eq!(normalized, None);
        assert!(!edited);
    }

    #[test]
    fn keeps_valid_upc_and_flags_edit_when_reformatted() {
        let (normalized, edited) = normalize_publisher_numbers(&[publisher(&["123 456 789012"])]);
        assert_eq!(normalized.as_deref(), Some("123456789012"));
        assert!(edited);
    }

    #[test]
    fn drops_address_fragments() {
        let (normalized, _) = normalize_publisher_numbers(&[publisher(&["123 Main Street"])]);
        assert_eq!(normalized, None);
    }

    #[test]
    fn bare_year_is_not_flagged_as_edited() {
        let (year, edited) = normalize_date("1971");
        assert_eq!(year, Some(1971));
        assert!(!edited);
    }

    #[test]
    fn copyright_symbol_is_flagged_as_edited() {
        let (year, edited) = normalize_date("©1971");
        assert_eq!(year, Some(1971));
        assert!(edited);
    }

    #[test]
    fn complex_date_with_month_day_is_flagged() {
        let (year, edited) = normalize_date("March 3, 1971");
        assert_eq!(year, Some(1971));
        assert!(edited);
    }

    #[test]
    fn not_visible_yields_no_edit() {
        let (year, edited) = normalize_date("Not visible");
        assert_eq!(year, None);
        assert!(!edited);
    }
}
