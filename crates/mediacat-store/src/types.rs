//! The Item data model: the closed schema named in §3, replacing the
//! original's dynamic, partially-typed metadata dictionaries. Unknown
//! fields from the LLM extraction are retained in `raw_metadata` for
//! provenance only; they never participate in downstream logic.

use serde::{Deserialize, Serialize};

/// Forward-only status an Item passes through. `Failed` carries a cause but
/// never erases prior stage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Created,
    Stage1Done,
    Stage15Done,
    Stage2Done,
    Stage3Done,
    Stage4Done,
    Stage5Done,
    Failed,
}

impl ItemStatus {
    /// `true` if `next` is a legal forward transition from `self`.
    /// `Failed` is reachable from any non-terminal status; nothing follows it.
    pub fn can_advance_to(self, next: ItemStatus) -> bool {
        if next == ItemStatus::Failed {
            return self != ItemStatus::Failed;
        }
        use ItemStatus::*;
        let order = [
            Created, Stage1Done, Stage15Done, Stage2Done, Stage3Done, Stage4Done, Stage5Done,
        ];
        let Some(from_idx) = order.iter().position(|s| *s == self) else {
            return false;
        };
        let Some(to_idx) = order.iter().position(|s| *s == next) else {
            return false;
        };
        to_idx == from_idx + 1
    }
}

/// Which of front/back/additional an image represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Front,
    Back,
    Additional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub role: ImageRole,
    pub path: String,
}

/// The medium-specific query/normalization profile (§4.12), replacing
/// duplicated CD/LP code paths with one pipeline parameterized by this
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Cd,
    Lp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub name: Option<String>,
    pub place: Option<String>,
    pub numbers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub number: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCallInfo {
    pub provider: Option<String>,
    pub model_used: Option<String>,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub batch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage1Record {
    pub raw_response: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub primary_contributor: Option<String>,
    pub additional_contributors: Vec<String>,
    pub publishers: Vec<Publisher>,
    pub publication_date: Option<String>,
    pub languages: Vec<String>,
    pub format: Option<String>,
    pub physical_description: Option<String>,
    pub track_list: Vec<Track>,
    pub notes: Option<String>,
    /// A romanized transliteration of `title`, if the vision model supplied
    /// one for non-Latin-script packaging. `QueryBuilder` only strips
    /// non-Latin characters from a query when this is present (§4.7).
    pub romanized_title: Option<String>,
    pub raw_metadata: Option<serde_json::Value>,
    pub call: LlmCallInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage1HalfRecord {
    pub numbers_edited: bool,
    pub date_edited: bool,
    pub normalized_publisher_number: Option<String>,
    pub normalized_year: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingsSummary {
    pub held_by_institution: bool,
    pub total_holding_count: u32,
    pub institution_symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub oclc_number: String,
    pub title: String,
    pub contributors: Vec<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub format: Option<String>,
    pub track_titles: Vec<String>,
    pub holdings: HoldingsSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub hit_count: u32,
    pub skipped_too_broad: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage2Record {
    pub queries_attempted: Vec<String>,
    pub query_log: Vec<QueryLogEntry>,
    pub candidates: Vec<Candidate>,
}

/// One alternative OCLC number from the selection model's response,
/// enriched with holdings when it matches a Stage-2 candidate (§4.8:
/// "enriched with `held_by_institution` and holding count by
/// substring-matching the candidate block").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeMatch {
    pub oclc_number: String,
    pub held_by_institution: Option<bool>,
    pub total_holding_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage3Record {
    pub selected_oclc: String,
    pub initial_confidence: u8,
    pub explanation: String,
    pub alternative_oclc_numbers: Vec<AlternativeMatch>,
    pub not_in_candidates: bool,
    pub call: LlmCallInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceAdjustment {
    pub adjusted: bool,
    pub reason: Option<String>,
    pub previous: u8,
    pub new: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage4Record {
    pub track_similarity_percentage: f64,
    pub year_match: Option<bool>,
    pub adjustment: ConfidenceAdjustment,
    pub final_confidence: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionGroup {
    AlmaBatchUpload,
    HeldByInstitution,
    CatalogerReview,
    Duplicate,
}

impl DispositionGroup {
    pub fn label(self) -> &'static str {
        match self {
            Self::AlmaBatchUpload => "Alma Batch Upload (High Confidence)",
            Self::HeldByInstitution => "Held by UT Libraries (IXA)",
            Self::CatalogerReview => "Cataloger Review (Low Confidence)",
            Self::Duplicate => "Duplicate",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage5Record {
    pub disposition: Option<DispositionGroup>,
    pub duplicate_flag: bool,
    pub authoritative_title: Option<String>,
    pub authoritative_author: Option<String>,
    pub authoritative_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub barcode: String,
    pub media_kind: MediaKind,
    pub images: Vec<ImageRef>,
    pub status: ItemStatus,
    pub failure_reason: Option<String>,
    pub stage1: Option<Stage1Record>,
    pub stage15: Option<Stage1HalfRecord>,
    pub stage2: Option<Stage2Record>,
    pub stage3: Option<Stage3Record>,
    pub stage4: Option<Stage4Record>,
    pub stage5: Option<Stage5Record>,
}

impl Item {
    pub fn new(barcode: impl Into<String>, media_kind: MediaKind, images: Vec<ImageRef>) -> Self {
        Self {
            barcode: barcode.into(),
            media_kind,
            images,
            status: ItemStatus::Created,
            failure_reason: None,
            stage1: None,
            stage15: None,
            stage2: None,
            stage3: None,
            stage4: None,
            stage5: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_advances_only_one_step_forward() {
        assert!(ItemStatus::Created.can_advance_to(ItemStatus::Stage1Done));
        assert!(!ItemStatus::Created.can_advance_to(ItemStatus::Stage2Done));
        assert!(!ItemStatus::Stage1Done.can_advance_to(ItemStatus::Created));
    }

    #[test]
    fn failed_reachable_from_any_non_terminal_status() {
        assert!(ItemStatus::Stage2Done.can_advance_to(ItemStatus::Failed));
        assert!(!ItemStatus::Failed.can_advance_to(ItemStatus::Stage1Done));
    }
}
