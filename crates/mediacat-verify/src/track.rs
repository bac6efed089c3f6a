//! Track-listing comparison (§4.9): normalization, multi-part-work
//! collapsing, per-track match scoring, and the aggregate similarity used
//! to adjust Stage-3 confidence.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::ratcliff_obershelp::ratio as ro_ratio;

static LEADING_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(the|an?)\s+(.+)$").expect("valid regex"));
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));
static MULTI_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(part|movement)\s+([0-9]+|[ivxlcdm]+)$").expect("valid regex"));

fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !unicode_normalization::char::is_combining_mark(*c)).collect()
}

/// Lowercase, strip diacritics, move a leading article to a trailing
/// ", the"/", a"/", an", remove parenthetical qualifiers, collapse
/// whitespace, drop non-alphanumerics.
pub fn normalize_track_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = strip_diacritics(&lowered);
    let without_parens = PARENTHETICAL.replace_all(&stripped, "");
    let article_moved = if let Some(caps) = LEADING_ARTICLE.captures(without_parens.trim()) {
        format!("{}, {}", &caps[2], &caps[1])
    } else {
        without_parens.trim().to_string()
    };
    let alnum_only: String = article_moved
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    alnum_only.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One metadata track after consecutive `Part N` / `Movement N` entries
/// are folded into the preceding title (§4.9 "Multi-part work collapsing").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedTrack {
    pub title: String,
    pub part_count: Option<usize>,
}

pub fn collapse_multi_part(titles: &[String]) -> Vec<CollapsedTrack> {
    let mut result: Vec<CollapsedTrack> = Vec::new();
    for title in titles {
        if MULTI_PART.is_match(title.trim()) {
            if let Some(last) = result.last_mut() {
                let count = last.part_count.unwrap_or(1) + 1;
                last.part_count = Some(count);
                continue;
            }
        }
        result.push(CollapsedTrack {
            title: title.clone(),
            part_count: None,
        });
    }
    result
}

fn word_set(s: &str) -> HashSet<&str> {
    s.split_whitespace().collect()
}

/// Per-track match score (§4.9): substring containment wins outright
/// (floor 0.85), then word-set overlap (floor 0.8), falling back to the
/// raw Ratcliff/Obershelp ratio.
pub fn track_match_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return ro_ratio(a, b).max(0.85);
    }

    let set_a = word_set(a);
    let set_b = word_set(b);
    let shorter = set_a.len().min(set_b.len());
    if shorter > 0 {
        let overlap = set_a.intersection(&set_b).count();
        let overlap_ratio = overlap as f64 / shorter as f64;
        if overlap_ratio >= 0.6 {
            return overlap_ratio.max(0.8);
        }
    }

    ro_ratio(a, b)
}

/// Sum of best-match scores per metadata track, divided by metadata track
/// count, times 100. When multi-part groups are present and the result is
/// below 80, a capped +10 bonus is added (never pushing the result above
/// 80) so multi-part works aren't over-penalized without being artificially
/// upgraded past the review threshold (§4.9, §9 Open Question: implemented
/// as a cap, see DESIGN.md).
pub fn track_similarity(metadata_titles: &[String], candidate_titles: &[String]) -> f64 {
    if metadata_titles.is_empty() {
        return 0.0;
    }
    let collapsed = collapse_multi_part(metadata_titles);
    let has_multi_part = collapsed.iter().any(|t| t.part_count.is_some());

    let normalized_candidates: Vec<String> = candidate_titles.iter().map(|t| normalize_track_title(t)).collect();

    let total: f64 = collapsed
        .iter()
        .map(|track| {
            let normalized_meta = normalize_track_title(&track.title);
            normalized_candidates
                .iter()
                .map(|cand| track_match_score(&normalized_meta, cand))
                .fold(0.0_f64, f64::max)
        })
        .sum();

    let mut similarity = (total / collapsed.len() as f64) * 100.0;
    if has_multi_part && similarity < 80.0 {
        similarity = (similarity + 10.0).min(80.0);
    }
    similarity
}
