//! Parses the vision model's free-form Stage-1 response (§4.2, §8
//! "Parsing the Stage-1 structured text, then re-serializing to canonical
//! form, yields a fixed-point after one pass") into a [`Stage1Record`].
//!
//! The prompt in `prompts.rs` fixes a labeled-field response shape mirroring
//! the one [`mediacat_selection::parse`] expects from the selection model:
//! strict about the field labels, tolerant of spacing and punctuation
//! around them. Unrecognized or absent fields simply stay `None`/empty
//! rather than erroring, since a vision model legitimately cannot read
//! every field on every item.

use mediacat_store::{Publisher, Stage1Record, Track};

const FIELD_MARKERS: &[&str] = &[
    "Title:",
    "Subtitle:",
    "Primary contributor:",
    "Additional contributors:",
    "Publishers:",
    "Publication date:",
    "Languages:",
    "Format:",
    "Physical description:",
    "Notes:",
    "Romanized title:",
    "Track list:",
];

/// The text between `marker` and whichever other known marker comes next,
/// or the end of the response if none does. `None` if `marker` is absent.
fn field_body(raw: &str, marker: &str) -> Option<String> {
    let start = raw.find(marker)? + marker.len();
    let rest = &raw[start..];
    let end = FIELD_MARKERS
        .iter()
        .filter(|m| **m != marker)
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

fn is_not_visible(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("not visible") || s.eq_ignore_ascii_case("none")
}

fn single_line_field(raw: &str, marker: &str) -> Option<String> {
    let body = field_body(raw, marker)?;
    let line = body.lines().next().unwrap_or("").trim();
    (!is_not_visible(line)).then(|| line.to_string())
}

fn csv_field(raw: &str, marker: &str) -> Vec<String> {
    let Some(body) = field_body(raw, marker) else {
        return Vec::new();
    };
    let line = body.lines().next().unwrap_or("").trim();
    if is_not_visible(line) {
        return Vec::new();
    }
    line.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn block_field(raw: &str, marker: &str) -> Option<String> {
    let body = field_body(raw, marker)?;
    (!is_not_visible(body.trim())).then(|| body.trim().to_string())
}

/// Parses `Publishers:` lines of the form `name | place | number1, number2`.
/// Any segment may be blank; a line with no `|` at all is treated as a bare
/// publisher name.
fn parse_publishers(raw: &str) -> Vec<Publisher> {
    let Some(body) = field_body(raw, "Publishers:") else {
        return Vec::new();
    };
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_not_visible(line))
        .map(|line| {
            let mut parts = line.splitn(3, '|').map(str::trim);
            let name = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            let place = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            let numbers = parts
                .next()
                .map(|n| n.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            Publisher { name, place, numbers }
        })
        .collect()
}

/// Parses `Track list:` numbered lines (`1. Respect`); the number is kept
/// as printed rather than re-derived from position, since a vision model
/// occasionally skips or relabels a track number.
fn parse_track_list(raw: &str) -> Vec<Track> {
    let Some(body) = field_body(raw, "Track list:") else {
        return Vec::new();
    };
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_not_visible(line))
        .map(|line| match line.split_once('.') {
            Some((number, title)) if number.trim().chars().all(|c| c.is_ascii_digit()) && !number.trim().is_empty() => Track {
                number: Some(number.trim().to_string()),
                title: title.trim().to_string(),
            },
            _ => Track {
                number: None,
                title: line.to_string(),
            },
        })
        .collect()
}

/// Parses the vision model's raw response text into a [`Stage1Record`].
/// `call` (provider/model/token accounting) is stamped in separately by the
/// caller once the executor reports cost, so this function stays pure.
pub fn parse(raw: &str) -> Stage1Record {
    Stage1Record {
        raw_response: raw.to_string(),
        title: single_line_field(raw, "Title:"),
        subtitle: single_line_field(raw, "Subtitle:"),
        primary_contributor: single_line_field(raw, "Primary contributor:"),
        additional_contributors: csv_field(raw, "Additional contributors:"),
        publishers: parse_publishers(raw),
        publication_date: single_line_field(raw, "Publication date:"),
        languages: csv_field(raw, "Languages:"),
        format: single_line_field(raw, "Format:"),
        physical_description: block_field(raw, "Physical description:"),
        track_list: parse_track_list(raw),
        notes: block_field(raw, "Notes:"),
        romanized_title: single_line_field(raw, "Romanized title:"),
        raw_metadata: None,
        call: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_utils::canonicalization::to_canonical_json;

    const SAMPLE: &str = "\
Title: Greatest Hits
Subtitle: Not visible
Primary contributor: Aretha Franklin
Additional contributors: Jerry Wexler, Tom Dowd
Publishers: Atlantic | New York | 075678264023, SD-1234
Publication date: \u{00A9}1971
Languages: English
Format: CD
Physical description: 1 audio disc : digital ; 4 3/4 in.
Notes: Booklet includes liner notes
Romanized title: Not visible
Track list:
1. Respect
2. Think
3. Chain of Fools
";

    #[test]
    fn parses_every_labeled_field() {
        let record = parse(SAMPLE);
        assert_eq!(record.title.as_deref(), Some("Greatest Hits"));
        assert_eq!(record.subtitle, None);
        assert_eq!(record.primary_contributor.as_deref(), Some("Aretha Franklin"));
        assert_eq!(record.additional_contributors, vec!["Jerry Wexler", "Tom Dowd"]);
        assert_eq!(record.publishers.len(), 1);
        assert_eq!(record.publishers[0].name.as_deref(), Some("Atlantic"));
        assert_eq!(record.publishers[0].numbers, vec!["075678264023", "SD-1234"]);
        assert_eq!(record.publication_date.as_deref(), Some("\u{00A9}1971"));
        assert_eq!(record.languages, vec!["English"]);
        assert_eq!(record.format.as_deref(), Some("CD"));
        assert_eq!(record.track_list.len(), 3);
        assert_eq!(record.track_list[0].title, "Respect");
        assert_eq!(record.track_list[0].number.as_deref(), Some("1"));
        assert_eq!(record.romanized_title, None);
    }

    #[test]
    fn not_visible_fields_become_none() {
        let record = parse("Title: Not visible\nPrimary contributor: Not visible\n");
        assert_eq!(record.title, None);
        assert_eq!(record.primary_contributor, None);
    }

    #[test]
    fn missing_fields_are_absent_not_errors() {
        let record = parse("Title: Only Title Known\n");
        assert_eq!(record.title.as_deref(), Some("Only Title Known"));
        assert!(record.track_list.is_empty());
        assert!(record.publishers.is_empty());
    }

    #[test]
    fn parsing_is_idempotent_under_canonical_serialization() {
        let record = parse(SAMPLE);
        let canonical_once = to_canonical_json(&record).unwrap();
        let reparsed: Stage1Record = serde_json::from_str(&canonical_once).unwrap();
        let canonical_twice = to_canonical_json(&reparsed).unwrap();
        assert_eq!(canonical_once, canonical_twice);
    }
}
