//! Stage-5 disposition assignment (§4.10): groups duplicates within a run,
//! applies the institutional-holdings and confidence rules, and assigns
//! each Item to exactly one disposition group.

use std::collections::HashMap;

use mediacat_config::Thresholds;
use mediacat_store::{DispositionGroup, Stage5Record};
use mediacat_verify::ratio;

/// Everything the disposition engine needs about one Item's terminal
/// selection, gathered from stages 3/4 plus the Alma verification call.
#[derive(Debug, Clone)]
pub struct DispositionInput {
    pub barcode: String,
    pub oclc_number: String,
    pub confidence: u8,
    pub held_by_institution: bool,
    pub authoritative_title: Option<String>,
    pub authoritative_author: Option<String>,
    pub authoritative_date: Option<String>,
}

fn is_real_oclc(oclc: &str) -> bool {
    !oclc.is_empty() && oclc != "0"
}

/// Union-find over item indices: two items are linked if they share an
/// OCLC number or their titles are near-duplicates (§4.10).
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

fn group_duplicates(items: &[DispositionInput], duplicate_title_threshold: f64) -> Vec<Vec<usize>> {
    let mut dsu = DisjointSet::new(items.len());

    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let same_oclc = is_real_oclc(&items[i].oclc_number)
                && is_real_oclc(&items[j].oclc_number)
                && items[i].oclc_number == items[j].oclc_number;

            let similar_title = match (&items[i].authoritative_title, &items[j].authoritative_title) {
                (Some(a), Some(b)) => ratio(&a.to_lowercase(), &b.to_lowercase()) >= duplicate_title_threshold,
                _ => false,
            };

            if same_oclc || similar_title {
                dsu.union(i, j);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..items.len() {
        let root = dsu.find(i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

/// Assigns a [`Stage5Record`] to every input, keyed by barcode. Duplicate
/// detection runs across the whole run: within each duplicate group the
/// highest-confidence Item is kept un-demoted (ties broken by first-seen
/// barcode, i.e. lowest index); the rest are flagged `duplicate_flag` and
/// assigned [`DispositionGroup::Duplicate`].
pub fn assign_dispositions(items: &[DispositionInput], thresholds: &Thresholds) -> HashMap<String, Stage5Record> {
    let mut duplicate_flags = vec![false; items.len()];

    for group in group_duplicates(items, thresholds.duplicate_title_threshold) {
        if group.len() < 2 {
            continue;
        }
        // `group` is already in ascending (first-seen) index order; a
        // strict `>` keeps the earliest index among ties rather than
        // `max_by_key`, which would keep the last.
        let mut keeper = group[0];
        for &idx in &group[1..] {
            if items[idx].confidence > items[keeper].confidence {
                keeper = idx;
            }
        }
        for idx in group {
            if idx != keeper {
                duplicate_flags[idx] = true;
            }
        }
    }

    let mut results = HashMap::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let duplicate_flag = duplicate_flags[idx];
        let disposition = if duplicate_flag {
            DispositionGroup::Duplicate
        } else if item.held_by_institution {
            DispositionGroup::HeldByInstitution
        } else if item.confidence >= thresholds.high_confidence_threshold {
            DispositionGroup::AlmaBatchUpload
        } else {
            DispositionGroup::CatalogerReview
        };

        results.insert(
            item.barcode.clone(),
            Stage5Record {
                disposition: Some(disposition),
                duplicate_flag,
                authoritative_title: item.authoritative_title.clone(),
                authoritative_author: item.authoritative_author.clone(),
                authoritative_date: item.authoritative_date.clone(),
            },
        );
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(barcode: &str, oclc: &str, confidence: u8, held: bool, title: &str) -> DispositionInput {
        DispositionInput {
            barcode: barcode.to_string(),
            oclc_number: oclc.to_string(),
            confidence,
            held_by_institution: held,
            authoritative_title: Some(title.to_string()),
            authoritative_author: None,
            authoritative_date: None,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn high_confidence_unique_item_goes_to_alma_batch_upload() {
        let items = vec![input("1", "111", 95, false, "Some Album")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["1"].disposition, Some(DispositionGroup::AlmaBatchUpload));
    }

    #[test]
    fn held_by_institution_wins_over_high_confidence() {
        let items = vec![input("1", "111", 95, true, "Some Album")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["1"].disposition, Some(DispositionGroup::HeldByInstitution));
    }

    #[test]
    fn below_threshold_goes_to_cataloger_review() {
        let items = vec![input("1", "111", 60, false, "Some Album")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["1"].disposition, Some(DispositionGroup::CatalogerReview));
    }

    #[test]
    fn same_oclc_number_demotes_lower_confidence_peer() {
        let items = vec![input("1", "111", 95, false, "Album A"), input("2", "111", 70, false, "Album A Reissue")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["1"].disposition, Some(DispositionGroup::AlmaBatchUpload));
        assert!(!result["1"].duplicate_flag);
        assert_eq!(result["2"].disposition, Some(DispositionGroup::Duplicate));
        assert!(result["2"].duplicate_flag);
    }

    #[test]
    fn similar_titles_without_shared_oclc_are_flagged_duplicate() {
        let items = vec![input("1", "111", 95, false, "The Dark Side of the Moon"), input("2", "222", 80, false, "The Dark Side of the Moon")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["2"].disposition, Some(DispositionGroup::Duplicate));
    }

    #[test]
    fn distinct_titles_are_not_flagged_duplicate() {
        let items = vec![input("1", "111", 95, false, "Abbey Road"), input("2", "222", 90, false, "Let It Be")];
        let result = assign_dispositions(&items, &thresholds());
        assert!(!result["1"].duplicate_flag);
        assert!(!result["2"].duplicate_flag);
    }

    #[test]
    fn exact_confidence_tie_keeps_first_seen_item() {
        let items = vec![input("first", "111", 90, false, "Album A"), input("second", "111", 90, false, "Album A")];
        let result = assign_dispositions(&items, &thresholds());
        assert_eq!(result["first"].disposition, Some(DispositionGroup::AlmaBatchUpload));
        assert!(!result["first"].duplicate_flag);
        assert_eq!(result["second"].disposition, Some(DispositionGroup::Duplicate));
        assert!(result["second"].duplicate_flag);
    }
}
