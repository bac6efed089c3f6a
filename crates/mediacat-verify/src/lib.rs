pub mod clean;
pub mod ratcliff_obershelp;
pub mod stage4;
pub mod track;
pub mod year;

pub use clean::clean;
pub use ratcliff_obershelp::ratio;
pub use stage4::{should_verify, verify};
pub use track::{collapse_multi_part, normalize_track_title, track_match_score, track_similarity};
pub use year::extract_year;
