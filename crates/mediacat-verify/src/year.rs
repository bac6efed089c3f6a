//! Year extraction and normalization (§4.9 "Year normalization"), shared
//! between Stage-1.5 cleaning and Stage-4 verification.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static YEAR_CANDIDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("valid regex"));

/// Extracts a plausible publication year from free-form text such as
/// `"©1971"`, `"p1971 (r1998)"`, or `"1971, reissued 2005"`. Copyright (©)
/// and phonogram (℗) symbols are not matched by the digit pattern, so they
/// never influence the result beyond whatever digits sit next to them.
/// Candidates outside `[1900, current_year]` are discarded; when several
/// plausible years remain, the most frequently occurring one wins (ties
/// keep the first-seen candidate).
pub fn extract_year(text: &str) -> Option<i32> {
    let current_year = chrono::Utc::now().year();
    let mut counts: HashMap<i32, usize> = HashMap::new();
    let mut first_seen: HashMap<i32, usize> = HashMap::new();

    for (idx, m) in YEAR_CANDIDATE.find_iter(text).enumerate() {
        let Ok(year) = m.as_str().parse::<i32>() else {
            continue;
        };
        if year < 1900 || year > current_year {
            continue;
        }
        *counts.entry(year).or_insert(0) += 1;
        first_seen.entry(year).or_insert(idx);
    }

    counts
        .into_iter()
        .max_by_key(|(year, count)| (*count, std::cmp::Reverse(first_seen[year])))
        .map(|(year, _)| year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_year_after_copyright_symbol() {
        assert_eq!(extract_year("©1971"), Some(1971));
    }

    #[test]
    fn extracts_year_after_phonogram_symbol() {
        assert_eq!(extract_year("℗1971 Atlantic Records"), Some(1971));
    }

    #[test]
    fn ignores_years_outside_plausible_range() {
        assert_eq!(extract_year("1850 reissue"), None);
    }

    #[test]
    fn picks_most_frequent_among_multiple_candidates() {
        let text = "1971 pressing, rereleased 1998, catalog stamped 1971 again";
        assert_eq!(extract_year(text), Some(1971));
    }

    #[test]
    fn no_digits_yields_none() {
        assert_eq!(extract_year("no date visible"), None);
    }
}
