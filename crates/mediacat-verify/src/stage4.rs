//! Stage-4 verification orchestration (§4.9): combines track similarity
//! and year comparison into a confidence adjustment for an already-selected
//! candidate.

use mediacat_config::Thresholds;
use mediacat_store::{Candidate, ConfidenceAdjustment, Stage1Record, Stage3Record, Stage4Record};

use crate::track::track_similarity;
use crate::year::extract_year;

/// `true` when `initial_confidence` clears the bar for Stage-4 to run at
/// all (§4.9: "for high-confidence selections").
pub fn should_verify(initial_confidence: u8, thresholds: &Thresholds) -> bool {
    initial_confidence >= thresholds.high_confidence_threshold
}

/// Runs the full Stage-4 algorithm against a selected candidate. Callers
/// should check [`should_verify`] first; when `initial_confidence` is
/// below threshold this returns an unadjusted pass-through record so the
/// function stays total.
pub fn verify(stage1: &Stage1Record, candidate: &Candidate, stage3: &Stage3Record, thresholds: &Thresholds) -> Stage4Record {
    let initial_confidence = stage3.initial_confidence;
    if !should_verify(initial_confidence, thresholds) {
        return Stage4Record {
            track_similarity_percentage: 0.0,
            year_match: None,
            adjustment: ConfidenceAdjustment::default(),
            final_confidence: initial_confidence,
        };
    }

    let metadata_tracks: Vec<String> = stage1.track_list.iter().map(|t| t.title.clone()).collect();
    let metadata_year = stage1.publication_date.as_deref().and_then(extract_year);
    let candidate_year = candidate.date.as_deref().and_then(extract_year);

    let track_similarity_percentage = if metadata_tracks.is_empty() {
        0.0
    } else {
        track_similarity(&metadata_tracks, &candidate.track_titles)
    };

    let year_match = match (metadata_year, candidate_year) {
        (Some(a), Some(b)) => Some(a == b),
        _ => None,
    };

    let enough_tracks = metadata_tracks.len() >= 3 && candidate.track_titles.len() >= 3;
    let track_penalty = enough_tracks && track_similarity_percentage < 80.0;
    let year_penalty = matches!(year_match, Some(false));

    if !track_penalty && !year_penalty {
        return Stage4Record {
            track_similarity_percentage,
            year_match,
            adjustment: ConfidenceAdjustment::default(),
            final_confidence: initial_confidence,
        };
    }

    let reason = match (track_penalty, year_penalty) {
        (true, true) => format!(
            "track similarity {:.0}% below threshold and publication year mismatch (metadata: {}, OCLC: {})",
            track_similarity_percentage,
            metadata_year.map(|y| y.to_string()).unwrap_or_else(|| "unknown".to_string()),
            candidate_year.map(|y| y.to_string()).unwrap_or_else(|| "unknown".to_string()),
        ),
        (false, true) => format!(
            "publication year mismatch (metadata: {}, OCLC: {})",
            metadata_year.expect("year_penalty implies both years present"),
            candidate_year.expect("year_penalty implies both years present"),
        ),
        (true, false) => format!("track similarity {:.0}% below threshold", track_similarity_percentage),
        (false, false) => unreachable!("checked above"),
    };

    Stage4Record {
        track_similarity_percentage,
        year_match,
        adjustment: ConfidenceAdjustment {
            adjusted: true,
            reason: Some(reason),
            previous: initial_confidence,
            new: thresholds.review_threshold,
        },
        final_confidence: thresholds.review_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_store::{HoldingsSummary, LlmCallInfo, Track};

    fn stage1(tracks: &[&str], date: &str) -> Stage1Record {
        Stage1Record {
            track_list: tracks
                .iter()
                .map(|t| Track {
                    number: None,
                    title: t.to_string(),
                })
                .collect(),
            publication_date: Some(date.to_string()),
            ..Default::default()
        }
    }

    fn candidate(tracks: &[&str], date: &str) -> Candidate {
        Candidate {
            oclc_number: "1".to_string(),
            title: "Some Album".to_string(),
            contributors: vec![],
            publisher: None,
            date: Some(date.to_string()),
            format: None,
            track_titles: tracks.iter().map(|t| t.to_string()).collect(),
            holdings: HoldingsSummary::default(),
        }
    }

    fn stage3(confidence: u8) -> Stage3Record {
        Stage3Record {
            selected_oclc: "1".to_string(),
            initial_confidence: confidence,
            explanation: "test".to_string(),
            alternative_oclc_numbers: vec![],
            not_in_candidates: false,
            call: LlmCallInfo::default(),
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn below_threshold_selections_pass_through_unadjusted() {
        let record = verify(&stage1(&["Track A"], "1971"), &candidate(&["Track A"], "1971"), &stage3(60), &thresholds());
        assert!(!record.adjustment.adjusted);
        assert_eq!(record.final_confidence, 60);
    }

    #[test]
    fn year_mismatch_demotes_to_review_threshold() {
        let record = verify(
            &stage1(&["Track A", "Track B", "Track C"], "1971"),
            &candidate(&["Track A", "Track B", "Track C"], "1968"),
            &stage3(90),
            &thresholds(),
        );
        assert_eq!(record.year_match, Some(false));
        assert_eq!(record.final_confidence, 79);
        assert!(record.adjustment.reason.unwrap().contains("publication year mismatch (metadata: 1971, OCLC: 1968)"));
    }

    #[test]
    fn matching_tracks_and_year_keep_initial_confidence() {
        let record = verify(
            &stage1(&["Track A", "Track B", "Track C"], "1971"),
            &candidate(&["Track A", "Track B", "Track C"], "1971"),
            &stage3(92),
            &thresholds(),
        );
        assert!(!record.adjustment.adjusted);
        assert_eq!(record.final_confidence, 92);
    }

    #[test]
    fn missing_year_on_either_side_is_not_penalized() {
        let mut item = stage1(&["Track A", "Track B", "Track C"], "Not visible");
        item.publication_date = None;
        let record = verify(&item, &candidate(&["Track A", "Track B", "Track C"], "1971"), &stage3(90), &thresholds());
        assert_eq!(record.year_match, None);
        assert!(!record.adjustment.adjusted);
    }
}
