//! Prompt construction for the two LLM-backed stages: Stage-1 vision
//! extraction and Stage-3 candidate selection (§4.2, §4.8).

use mediacat_llm::{ContentPart, Message};
use mediacat_store::Candidate;

const STAGE1_SYSTEM_PROMPT: &str = "You are a cataloging assistant. Examine the attached cover \
and label images of a CD or LP and extract structured bibliographic metadata. Report the title, \
subtitle, primary contributor, additional contributors, publishers (name, place, catalog/UPC \
numbers), publication date, languages, format, physical description, and the full track list \
exactly as printed. If the title is printed in a non-Latin script, also supply a romanized \
transliteration. If a field is not visible, say so explicitly rather than guessing.";

/// Builds the Stage-1 vision request body: one system message plus a user
/// message carrying every loaded image in role order.
pub fn build_stage1_messages(images: Vec<ContentPart>) -> Vec<Message> {
    vec![Message::system(STAGE1_SYSTEM_PROMPT), Message::user(images)]
}

fn format_candidate_block(candidates: &[Candidate]) -> String {
    let mut out = String::new();
    for (idx, candidate) in candidates.iter().enumerate() {
        out.push_str(&format!(
            "{}. OCLC {}: \"{}\" by {} ({}{}), held by {} institution(s)\n",
            idx + 1,
            candidate.oclc_number,
            candidate.title,
            candidate.contributors.join(", "),
            candidate.date.as_deref().unwrap_or("unknown date"),
            candidate
                .format
                .as_deref()
                .map(|f| format!(", {f}"))
                .unwrap_or_default(),
            candidate.holdings.institution_symbols.len(),
        ));
    }
    out
}

/// Builds the Stage-3 selection request: the metadata extracted in Stage 1
/// plus the numbered candidate list, instructing the model to answer in the
/// four-field numbered format `SelectionParser` expects (§4.8).
pub fn build_stage3_messages(
    title: Option<&str>,
    primary_contributor: Option<&str>,
    publication_date: Option<&str>,
    candidates: &[Candidate],
) -> Vec<Message> {
    let system = "You are a cataloging assistant choosing the best-matching WorldCat record for \
        a scanned item. Respond in exactly this format:\n\
        1. OCLC number: <the matching OCLC number, or \"No matching records found\">\n\
        2. Confidence score: <0-100>%\n\
        3. Explanation: <one or two sentences>\n\
        4. Other potential good matches: <comma-separated OCLC numbers, or \"No other potential good matches\">";

    let user_text = format!(
        "Scanned item metadata:\nTitle: {}\nPrimary contributor: {}\nPublication date: {}\n\n\
        Candidate records:\n{}",
        title.unwrap_or("unknown"),
        primary_contributor.unwrap_or("unknown"),
        publication_date.unwrap_or("unknown"),
        format_candidate_block(candidates),
    );

    vec![Message::system(system), Message::user_text(user_text)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediacat_store::HoldingsSummary;

    fn candidate() -> Candidate {
        Candidate {
            oclc_number: "123".to_string(),
            title: "Greatest Hits".to_string(),
            contributors: vec!["Aretha Franklin".to_string()],
            publisher: None,
            date: Some("1971".to_string()),
            format: None,
            track_titles: vec![],
            holdings: HoldingsSummary::default(),
        }
    }

    #[test]
    fn stage3_prompt_lists_every_candidate() {
        let messages = build_stage3_messages(Some("Greatest Hits"), Some("Aretha Franklin"), Some("1971"), &[candidate()]);
        let user_text = match &messages[1].content[0] {
            mediacat_llm::ContentPart::Text { text } => text.clone(),
            _ => panic!("expected text part"),
        };
        assert!(user_text.contains("OCLC 123"));
        assert!(user_text.contains("Greatest Hits"));
    }

    #[test]
    fn stage1_prompt_carries_all_image_parts() {
        let images = vec![ContentPart::image("image/png", "AAAA"), ContentPart::image("image/png", "BBBB")];
        let messages = build_stage1_messages(images);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content.len(), 2);
    }
}
