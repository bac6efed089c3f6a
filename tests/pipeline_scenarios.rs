//! End-to-end scenarios over the pure-computation stages (verification,
//! disposition, export) that need no network client: §8's concrete
//! scenarios 1-4, composed directly from the crates each stage lives in.

use camino::Utf8PathBuf;
use mediacat_config::Thresholds;
use mediacat_disposition::{assign_dispositions, render_alma_batch_export, DispositionInput, ExportRow};
use mediacat_store::{
    Candidate, HoldingsSummary, ImageRef, ImageRole, ItemStatus, LlmCallInfo, ManifestEntry, MediaKind, Stage1Record,
    Stage3Record, Track, WorkflowStore,
};
use mediacat_verify::verify;
use tempfile::tempdir;

fn thresholds() -> Thresholds {
    Thresholds::default()
}

fn stage1(title: &str, tracks: &[&str], date: &str) -> Stage1Record {
    Stage1Record {
        title: Some(title.to_string()),
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

fn candidate(oclc: &str, title: &str, tracks: &[&str], date: &str, held: bool) -> Candidate {
    Candidate {
        oclc_number: oclc.to_string(),
        title: title.to_string(),
        contributors: vec![],
        publisher: None,
        date: Some(date.to_string()),
        format: None,
        track_titles: tracks.iter().map(|t| t.to_string()).collect(),
        holdings: HoldingsSummary {
            held_by_institution: held,
            total_holding_count: if held { 1 } else { 0 },
            institution_symbols: if held { vec!["IXA".to_string()] } else { vec![] },
        },
    }
}

fn stage3(oclc: &str, confidence: u8) -> Stage3Record {
    Stage3Record {
        selected_oclc: oclc.to_string(),
        initial_confidence: confidence,
        explanation: "UPC and title match".to_string(),
        alternative_oclc_numbers: vec![],
        not_in_candidates: false,
        call: LlmCallInfo::default(),
    }
}

/// §8 scenario 1: happy path. A UPC-matched candidate with identical
/// tracks and year keeps its high confidence and lands in the Alma batch
/// export as a single pipe-delimited line.
#[test]
fn happy_path_upc_match_exports_to_alma_batch() {
    let tracks = ["Track One", "Track Two", "Track Three"];
    let s1 = stage1("Greatest Hits", &tracks, "1999");
    let cand = candidate("1234567", "Greatest Hits", &tracks, "1999", false);
    let s3 = stage3("1234567", 95);

    let s4 = verify(&s1, &cand, &s3, &thresholds());
    assert!(!s4.adjustment.adjusted);
    assert_eq!(s4.final_confidence, 95);

    let items = vec![DispositionInput {
        barcode: "059173017359115".to_string(),
        oclc_number: "1234567".to_string(),
        confidence: s4.final_confidence,
        held_by_institution: false,
        authoritative_title: Some("Greatest Hits".to_string()),
        authoritative_author: None,
        authoritative_date: Some("1999".to_string()),
    }];
    let dispositions = assign_dispositions(&items, &thresholds());
    let record = &dispositions["059173017359115"];
    assert_eq!(record.disposition, Some(mediacat_store::DispositionGroup::AlmaBatchUpload));

    let rows = vec![ExportRow {
        barcode: "059173017359115".to_string(),
        oclc_number: "1234567".to_string(),
        title: "Greatest Hits".to_string(),
        disposition: record.disposition,
    }];
    assert_eq!(render_alma_batch_export(&rows), "1234567|059173017359115|Greatest Hits\n");
}

/// §8 scenario 2: a publication-year mismatch demotes a high-confidence
/// selection to the review threshold, which in turn routes it to
/// cataloger review instead of the Alma batch export.
#[test]
fn year_mismatch_demotes_to_cataloger_review() {
    let tracks = ["Side A", "Side B", "Side C"];
    let s1 = stage1("Live at the Fillmore", &tracks, "1971");
    let cand = candidate("2222222", "Live at the Fillmore", &tracks, "1968", false);
    let s3 = stage3("2222222", 90);

    let s4 = verify(&s1, &cand, &s3, &thresholds());
    assert_eq!(s4.final_confidence, 79);
    assert!(s4
        .adjustment
        .reason
        .as_ref()
        .unwrap()
        .contains("publication year mismatch (metadata: 1971, OCLC: 1968)"));

    let items = vec![DispositionInput {
        barcode: "0123456789012".to_string(),
        oclc_number: "2222222".to_string(),
        confidence: s4.final_confidence,
        held_by_institution: false,
        authoritative_title: Some("Live at the Fillmore".to_string()),
        authoritative_author: None,
        authoritative_date: Some("1968".to_string()),
    }];
    let dispositions = assign_dispositions(&items, &thresholds());
    assert_eq!(
        dispositions["0123456789012"].disposition,
        Some(mediacat_store::DispositionGroup::CatalogerReview)
    );
}

/// §8 scenario 3: a high-confidence match already held by the institution
/// routes to `held_by_institution`, not the Alma batch upload, regardless
/// of confidence.
#[test]
fn held_by_institution_overrides_high_confidence() {
    let items = vec![DispositionInput {
        barcode: "0999999999999".to_string(),
        oclc_number: "3333333".to_string(),
        confidence: 97,
        held_by_institution: true,
        authoritative_title: Some("A Love Supreme".to_string()),
        authoritative_author: None,
        authoritative_date: Some("1965".to_string()),
    }];
    let dispositions = assign_dispositions(&items, &thresholds());
    assert_eq!(
        dispositions["0999999999999"].disposition,
        Some(mediacat_store::DispositionGroup::HeldByInstitution)
    );
}

/// §8 scenario 4: two items in the same run pick the same OCLC number
/// with confidences 90 and 85. The 85 is flagged `duplicate`; the 90 gets
/// `alma_batch_upload`.
#[test]
fn duplicate_within_run_keeps_higher_confidence_item() {
    let items = vec![
        DispositionInput {
            barcode: "a".to_string(),
            oclc_number: "7777777".to_string(),
            confidence: 90,
            held_by_institution: false,
            authoritative_title: Some("Kind of Blue".to_string()),
            authoritative_author: None,
            authoritative_date: Some("1959".to_string()),
        },
        DispositionInput {
            barcode: "b".to_string(),
            oclc_number: "7777777".to_string(),
            confidence: 85,
            held_by_institution: false,
            authoritative_title: Some("Kind of Blue".to_string()),
            authoritative_author: None,
            authoritative_date: Some("1959".to_string()),
        },
    ];
    let dispositions = assign_dispositions(&items, &thresholds());
    assert_eq!(dispositions["a"].disposition, Some(mediacat_store::DispositionGroup::AlmaBatchUpload));
    assert!(!dispositions["a"].duplicate_flag);
    assert_eq!(dispositions["b"].disposition, Some(mediacat_store::DispositionGroup::Duplicate));
    assert!(dispositions["b"].duplicate_flag);
}

/// On an exact confidence tie within a duplicate group, the first-seen
/// barcode (lowest index, not highest confidence-sorted) is kept.
#[test]
fn duplicate_tie_breaks_on_first_seen_barcode() {
    let items = vec![
        DispositionInput {
            barcode: "first-seen".to_string(),
            oclc_number: "8888888".to_string(),
            confidence: 88,
            held_by_institution: false,
            authoritative_title: Some("Blue Train".to_string()),
            authoritative_author: None,
            authoritative_date: Some("1957".to_string()),
        },
        DispositionInput {
            barcode: "second-seen".to_string(),
            oclc_number: "8888888".to_string(),
            confidence: 88,
            held_by_institution: false,
            authoritative_title: Some("Blue Train".to_string()),
            authoritative_author: None,
            authoritative_date: Some("1957".to_string()),
        },
    ];
    let dispositions = assign_dispositions(&items, &thresholds());
    assert_eq!(
        dispositions["first-seen"].disposition,
        Some(mediacat_store::DispositionGroup::AlmaBatchUpload)
    );
    assert_eq!(dispositions["second-seen"].disposition, Some(mediacat_store::DispositionGroup::Duplicate));
}

/// Monotonic progress: an Item's status only ever advances forward through
/// `WorkflowStore::update`, and a run reloaded from disk keeps whatever
/// stage each Item last committed (§8 "monotonic progress").
#[test]
fn workflow_store_enforces_monotonic_progress_across_reload() {
    let dir = tempdir().unwrap();
    let run_dir = Utf8PathBuf::from_path_buf(dir.path().join("results-1")).unwrap();
    let manifest = vec![ManifestEntry {
        barcode: "111222333".to_string(),
        media_kind: MediaKind::Cd,
        images: vec![ImageRef {
            role: ImageRole::Front,
            path: "front.png".to_string(),
        }],
    }];

    let (store, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();
    store.update("111222333", |item| item.status = ItemStatus::Stage1Done).unwrap();
    store.update("111222333", |item| item.status = ItemStatus::Stage15Done).unwrap();

    // Attempting to skip a stage is rejected and does not move the Item.
    let skip = store.update("111222333", |item| item.status = ItemStatus::Stage4Done);
    assert!(skip.is_err());
    assert_eq!(store.get("111222333").unwrap().status, ItemStatus::Stage15Done);
    drop(store);

    let (reloaded, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();
    assert_eq!(reloaded.get("111222333").unwrap().status, ItemStatus::Stage15Done);
}
