//! Stage-3 free-form LLM response parsing (§4.8): the selection model's
//! prompt fixes a four-field numbered response format, but the model's
//! text still needs a tolerant, strict-about-labels parser.

use once_cell::sync::Lazy;
use regex::Regex;

use mediacat_store::{AlternativeMatch, Candidate, LlmCallInfo, Stage3Record};

static ALTERNATIVE_OCLC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{8,10})\b").expect("valid regex"));
static TRAILING_NUMBERED_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\d+\.\s*$").expect("valid regex"));

fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim()
}

/// Splits on the first occurrence of `marker`, returning the text after it,
/// or `None` if the marker is absent.
fn after(text: &str, marker: &str) -> Option<String> {
    text.find(marker).map(|idx| text[idx + marker.len()..].to_string())
}

fn parse_selected_oclc(raw: &str) -> (String, bool) {
    match after(raw, "OCLC number:") {
        Some(rest) => {
            let line = first_line(&rest);
            if line.to_lowercase().contains("no matching records found") {
                ("0".to_string(), false)
            } else {
                let digits = digits_only(line);
                if digits.is_empty() {
                    ("0".to_string(), false)
                } else {
                    (digits, true)
                }
            }
        }
        None => ("0".to_string(), false),
    }
}

fn parse_confidence(raw: &str) -> u8 {
    let Some(rest) = after(raw, "Confidence score:") else {
        return 0;
    };
    let before_percent = rest.split('%').next().unwrap_or("").trim();
    match before_percent.parse::<f64>() {
        Ok(value) => value.round().clamp(0.0, 100.0) as u8,
        Err(_) => 0,
    }
}

fn parse_explanation(raw: &str) -> String {
    let Some(rest) = after(raw, "Explanation:") else {
        return String::new();
    };
    let explanation = rest.split("Other potential good matches:").next().unwrap_or("").trim();
    let explanation = explanation.strip_suffix("4.").unwrap_or(explanation).trim();
    TRAILING_NUMBERED_MARKER.replace(explanation, "").trim().to_string()
}

/// Enriches an alternative OCLC number with holdings when it matches a
/// Stage-2 candidate (§4.8). Numbers with no match in the candidate list
/// carry no holdings data rather than a false `0`.
fn enrich_alternative(oclc_number: String, candidates: &[Candidate]) -> AlternativeMatch {
    let candidate = candidates.iter().find(|c| c.oclc_number == oclc_number);

    match candidate {
        Some(c) => AlternativeMatch {
            oclc_number,
            held_by_institution: Some(c.holdings.held_by_institution),
            total_holding_count: Some(c.holdings.total_holding_count),
        },
        None => AlternativeMatch {
            oclc_number,
            held_by_institution: None,
            total_holding_count: None,
        },
    }
}

fn parse_alternatives(raw: &str, selected: &str, candidates: &[Candidate]) -> Vec<AlternativeMatch> {
    let Some(rest) = after(raw, "Other potential good matches:") else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in ALTERNATIVE_OCLC.find_iter(&rest) {
        let candidate = m.as_str().to_string();
        if candidate == selected {
            continue;
        }
        if seen.insert(candidate.clone()) {
            out.push(enrich_alternative(candidate, candidates));
        }
    }
    out
}

/// Parses the selection model's free-form response into a structured
/// [`Stage3Record`], cross-checking the selected OCLC number against the
/// Stage-2 candidate list.
pub fn parse(raw: &str, candidates: &[Candidate], call: LlmCallInfo) -> Stage3Record {
    let (selected_oclc, found_number) = parse_selected_oclc(raw);
    let initial_confidence = parse_confidence(raw);
    let explanation = parse_explanation(raw);
    let alternative_oclc_numbers = parse_alternatives(raw, &selected_oclc, candidates);

    let not_in_candidates =
        found_number && selected_oclc != "0" && !candidates.iter().any(|c| c.oclc_number == selected_oclc);

    Stage3Record {
        selected_oclc,
        initial_confidence,
        explanation,
        alternative_oclc_numbers,
        not_in_candidates,
        call,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_store::HoldingsSummary;

    fn candidate(oclc: &str) -> Candidate {
        candidate_with_holdings(oclc, HoldingsSummary::default())
    }

    fn candidate_with_holdings(oclc: &str, holdings: HoldingsSummary) -> Candidate {
        Candidate {
            oclc_number: oclc.to_string(),
            title: "Some Title".to_string(),
            contributors: vec![],
            publisher: None,
            date: None,
            format: None,
            track_titles: vec![],
            holdings,
        }
    }

    #[test]
    fn parses_well_formed_response() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: 92%\n3. Explanation: title and UPC match exactly.\n4. Other potential good matches: No other potential good matches.";
        let record = parse(raw, &[candidate("123456789")], LlmCallInfo::default());
        assert_eq!(record.selected_oclc, "123456789");
        assert_eq!(record.initial_confidence, 92);
        assert_eq!(record.explanation, "title and UPC match exactly.");
        assert!(record.alternative_oclc_numbers.is_empty());
        assert!(!record.not_in_candidates);
    }

    #[test]
    fn no_matching_records_yields_zero_confidence_and_selection() {
        let raw = "1. OCLC number: No matching records found\n2. Confidence score: 0%\n3. Explanation: no plausible match.\n4. Other potential good matches: No other potential good matches.";
        let record = parse(raw, &[], LlmCallInfo::default());
        assert_eq!(record.selected_oclc, "0");
        assert_eq!(record.initial_confidence, 0);
    }

    #[test]
    fn confidence_is_clamped_to_one_hundred() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: 150%\n3. Explanation: x\n4. Other potential good matches: none";
        let record = parse(raw, &[candidate("123456789")], LlmCallInfo::default());
        assert_eq!(record.initial_confidence, 100);
    }

    #[test]
    fn unparseable_confidence_becomes_zero() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: very high\n3. Explanation: x\n4. Other potential good matches: none";
        let record = parse(raw, &[candidate("123456789")], LlmCallInfo::default());
        assert_eq!(record.initial_confidence, 0);
    }

    #[test]
    fn extracts_alternatives_excluding_selected() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: 60%\n3. Explanation: x\n4. Other potential good matches: OCLC Number: 987654321 is close. OCLC Number: 123456789 was already selected.";
        let record = parse(raw, &[candidate("123456789"), candidate("987654321")], LlmCallInfo::default());
        assert_eq!(record.alternative_oclc_numbers.len(), 1);
        assert_eq!(record.alternative_oclc_numbers[0].oclc_number, "987654321");
    }

    #[test]
    fn alternatives_are_enriched_with_holdings_from_candidate_list() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: 60%\n3. Explanation: x\n4. Other potential good matches: OCLC Number: 987654321 is also plausible.";
        let holdings = HoldingsSummary {
            held_by_institution: true,
            total_holding_count: 42,
            institution_symbols: vec!["IXA".to_string()],
        };
        let record = parse(
            raw,
            &[candidate("123456789"), candidate_with_holdings("987654321", holdings)],
            LlmCallInfo::default(),
        );
        let alt = &record.alternative_oclc_numbers[0];
        assert_eq!(alt.held_by_institution, Some(true));
        assert_eq!(alt.total_holding_count, Some(42));
    }

    #[test]
    fn alternatives_absent_from_candidate_list_carry_no_holdings() {
        let raw = "1. OCLC number: 123456789\n2. Confidence score: 60%\n3. Explanation: x\n4. Other potential good matches: OCLC Number: 999999999 unseen elsewhere.";
        let record = parse(raw, &[candidate("123456789")], LlmCallInfo::default());
        let alt = &record.alternative_oclc_numbers[0];
        assert_eq!(alt.held_by_institution, None);
        assert_eq!(alt.total_holding_count, None);
    }

    #[test]
    fn flags_selection_not_present_in_candidate_list() {
        let raw = "1. OCLC number: 555555555\n2. Confidence score: 80%\n3. Explanation: x\n4. Other potential good matches: none";
        let record = parse(raw, &[candidate("123456789")], LlmCallInfo::default());
        assert!(record.not_in_candidates);
    }

    #[test]
    fn unparseable_response_yields_zero_confidence() {
        let record = parse("garbage text with no labels", &[], LlmCallInfo::default());
        assert_eq!(record.selected_oclc, "0");
        assert_eq!(record.initial_confidence, 0);
        assert_eq!(record.explanation, "");
    }
}
