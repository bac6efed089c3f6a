//! `QueryBuilder` (§4.7): from Stage-1 structured metadata, emits an
//! ordered, deduplicated list of search queries following the profile's
//! priority order.

use mediacat_store::{Stage1HalfRecord, Stage1Record};
use std::collections::HashSet;

use crate::profile::{MediaProfile, QueryKind};

const MIN_MEANINGFUL_TOKENS: usize = 3;

fn meaningful_token_count(s: &str) -> usize {
    s.split_whitespace().filter(|t| t.chars().any(|c| c.is_alphanumeric())).count()
}

/// Query text uses the romanized title in place of the original only when
/// the title actually contains non-Latin script *and* a romanized form was
/// supplied (§4.7: "Non-Latin characters are stripped only when the source
/// metadata includes a romanized form").
fn effective_title(stage1: &Stage1Record) -> Option<&str> {
    let title = stage1.title.as_deref()?;
    let has_non_latin = title.chars().any(|c| c.is_alphabetic() && !c.is_ascii());
    if has_non_latin
        && let Some(romanized) = stage1.romanized_title.as_deref()
        && !romanized.trim().is_empty()
    {
        return Some(romanized);
    }
    Some(title)
}

fn first_track_title(stage1: &Stage1Record) -> Option<&str> {
    stage1.track_list.first().map(|t| t.title.as_str())
}

fn identifier_alone(stage1: &Stage1Record, stage15: &Stage1HalfRecord) -> Option<String> {
    stage15
        .normalized_publisher_number
        .clone()
        .or_else(|| stage1.publishers.iter().find_map(|p| p.numbers.first().cloned()))
}

fn artist_and_first_track(stage1: &Stage1Record) -> Option<String> {
    let artist = stage1.primary_contributor.as_deref()?;
    let track = first_track_title(stage1)?;
    Some(format!("{artist} {track}"))
}

fn title_and_contributor(stage1: &Stage1Record) -> Option<String> {
    let title = effective_title(stage1)?;
    let contributor = stage1.primary_contributor.as_deref()?;
    Some(format!("{title} {contributor}"))
}

fn title_and_first_track(stage1: &Stage1Record) -> Option<String> {
    let title = effective_title(stage1)?;
    let track = first_track_title(stage1)?;
    Some(format!("{title} {track}"))
}

fn publisher_and_number(stage1: &Stage1Record, stage15: &Stage1HalfRecord, profile: &MediaProfile) -> Option<String> {
    let publisher = stage1.publishers.first()?;
    let name = publisher.name.as_deref()?;
    let number = stage15
        .normalized_publisher_number
        .as_deref()
        .or_else(|| publisher.numbers.first().map(String::as_str))?;
    Some(format!("{name} {number} {}", profile.sub_type))
}

fn title_contributor_language(stage1: &Stage1Record) -> Option<String> {
    let title = effective_title(stage1)?;
    let contributor = stage1.primary_contributor.as_deref()?;
    let language = stage1.languages.first().map(String::as_str).unwrap_or_default();
    let joined = format!("{title} {contributor} {language}");
    Some(joined.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn build_one(kind: QueryKind, stage1: &Stage1Record, stage15: &Stage1HalfRecord, profile: &MediaProfile) -> Option<String> {
    match kind {
        QueryKind::IdentifierAlone => identifier_alone(stage1, stage15),
        QueryKind::ArtistAndFirstTrack => artist_and_first_track(stage1),
        QueryKind::TitleAndContributor => title_and_contributor(stage1),
        QueryKind::TitleAndFirstTrack => title_and_first_track(stage1),
        QueryKind::PublisherAndNumber => publisher_and_number(stage1, stage15, profile),
        QueryKind::TitleContributorLanguage => title_contributor_language(stage1),
    }
}

/// Emits queries in `profile.query_priority` order, dropping any with fewer
/// than 3 meaningful tokens and removing duplicates (by normalized text)
/// while preserving first-seen order (§4.7).
pub fn build_queries(profile: &MediaProfile, stage1: &Stage1Record, stage15: &Stage1HalfRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queries = Vec::new();

    for kind in &profile.query_priority {
        let Some(query) = build_one(*kind, stage1, stage15, profile) else {
            continue;
        };
        let trimmed = query.trim().to_string();
        if trimmed.is_empty() || meaningful_token_count(&trimmed) < MIN_MEANINGFUL_TOKENS {
            // The identifier-alone query is exempt: a bare UPC/OCLC number
            // is a single token but is still the single strongest signal
            // available, and §8's boundary scenario requires it to be the
            // sole emitted query when nothing else is known.
            if kind == &QueryKind::IdentifierAlone && !trimmed.is_empty() {
                // fallthrough to dedup/push below
            } else {
                continue;
            }
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            queries.push(trimmed);
        }
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_store::{MediaKind, Publisher, Track};

    fn base_stage1() -> Stage1Record {
        Stage1Record {
            title: Some("Greatest Hits".to_string()),
            primary_contributor: Some("Aretha Franklin".to_string()),
            track_list: vec![
                Track {
                    number: Some("1".to_string()),
                    title: "Respect".to_string(),
                },
                Track {
                    number: Some("2".to_string()),
                    title: "Think".to_string(),
                },
            ],
            publishers: vec![Publisher {
                name: Some("Atlantic".to_string()),
                place: None,
                numbers: vec!["075678264023".to_string()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn only_publisher_number_known_emits_exactly_one_query() {
        let profile = MediaProfile::for_media_kind(MediaKind::Cd);
        let stage1 = Stage1Record {
            publishers: vec![Publisher {
                name: None,
                place: None,
                numbers: vec!["075678264023".to_string()],
            }],
            ..Default::default()
        };
        let stage15 = Stage1HalfRecord::default();
        let queries = build_queries(&profile, &stage1, &stage15);
        assert_eq!(queries, vec!["075678264023".to_string()]);
    }

    #[test]
    fn cd_queries_are_deduplicated_and_ordered() {
        let profile = MediaProfile::for_media_kind(MediaKind::Cd);
        let stage1 = base_stage1();
        let stage15 = Stage1HalfRecord {
            normalized_publisher_number: Some("075678264023".to_string()),
            ..Default::default()
        };
        let queries = build_queries(&profile, &stage1, &stage15);
        assert_eq!(queries[0], "075678264023");
        assert!(queries.contains(&"Aretha Franklin Respect".to_string()));
        assert!(queries.iter().collect::<HashSet<_>>().len() == queries.len());
    }

    #[test]
    fn romanized_title_used_only_when_non_latin_present() {
        let mut stage1 = base_stage1();
        stage1.title = Some("グレイテスト・ヒッツ".to_string());
        stage1.romanized_title = Some("Greatest Hits".to_string());
        let query = title_and_contributor(&stage1).unwrap();
        assert_eq!(query, "Greatest Hits Aretha Franklin");
    }

    #[test]
    fn latin_title_ignores_romanized_field() {
        let mut stage1 = base_stage1();
        stage1.romanized_title = Some("should not be used".to_string());
        let query = title_and_contributor(&stage1).unwrap();
        assert_eq!(query, "Greatest Hits Aretha Franklin");
    }
}
