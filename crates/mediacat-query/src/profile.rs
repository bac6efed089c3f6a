//! `MediaProfile` (§4.12, §9 "Duplicated CD vs LP code paths"): a single
//! pipeline parameterized by a small profile record instead of a second CD
//! code path copy-pasted for LPs.

use mediacat_store::MediaKind;

/// One shape of search query the builder can emit, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// UPC/EAN/ISBN alone.
    IdentifierAlone,
    /// Artist + first track title.
    ArtistAndFirstTrack,
    /// Main title + primary contributor.
    TitleAndContributor,
    /// Main title + first track title.
    TitleAndFirstTrack,
    /// Publisher + publisher number + format token.
    PublisherAndNumber,
    /// Main title + primary contributor + pressing language (LP emphasis).
    TitleContributorLanguage,
}

#[derive(Debug, Clone)]
pub struct MediaProfile {
    pub item_type: &'static str,
    pub sub_type: &'static str,
    pub query_priority: Vec<QueryKind>,
}

impl MediaProfile {
    pub fn for_media_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Cd => Self {
                item_type: "music",
                sub_type: "music-cd",
                query_priority: vec![
                    QueryKind::IdentifierAlone,
                    QueryKind::ArtistAndFirstTrack,
                    QueryKind::TitleAndContributor,
                    QueryKind::TitleAndFirstTrack,
                    QueryKind::PublisherAndNumber,
                ],
            },
            MediaKind::Lp => Self {
                item_type: "music",
                sub_type: "music-lp",
                // LPs rarely carry a scannable UPC on original pressings, so
                // title/contributor/pressing-language is tried first (§4.7
                // "the priority adjusts to emphasize title+contributor+
                // pressing-language"); see DESIGN.md for the Open Question
                // this resolves.
                query_priority: vec![
                    QueryKind::TitleContributorLanguage,
                    QueryKind::TitleAndContributor,
                    QueryKind::ArtistAndFirstTrack,
                    QueryKind::TitleAndFirstTrack,
                    QueryKind::IdentifierAlone,
                    QueryKind::PublisherAndNumber,
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_profile_emphasizes_title_contributor_language_first() {
        let profile = MediaProfile::for_media_kind(MediaKind::Lp);
        assert_eq!(profile.query_priority[0], QueryKind::TitleContributorLanguage);
        assert_eq!(profile.sub_type, "music-lp");
    }

    #[test]
    fn cd_profile_leads_with_identifier() {
        let profile = MediaProfile::for_media_kind(MediaKind::Cd);
        assert_eq!(profile.query_priority[0], QueryKind::IdentifierAlone);
        assert_eq!(profile.sub_type, "music-cd");
    }
}
