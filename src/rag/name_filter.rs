//! Programme-name queries: when the user names a known programme, every
//! grant whose title carries that name is surfaced

use tracing::info;

use crate::models::Candidate;

/// Known programme keywords, checked in order; the first contained one wins
pub const PROGRAMME_KEYWORDS: &[&str] = &[
    "biomedical catalyst",
    "biomed catalyst",
    "biomedical cat",
    "i4i",
    "invention for innovation",
    "horizon europe",
    "eureka",
    "digital europe",
    "smart grant",
    "sbri",
    "small business research",
    "nihr fellowship",
    "nihr professorship",
    "erc grant",
    "marie curie",
    "innovate uk",
    "knowledge transfer",
];

/// Programme keyword named in `query`, if any
pub fn detect_name_query(query: &str) -> Option<&'static str> {
    let lower = query.to_lowercase();
    let keyword = PROGRAMME_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lower.contains(keyword));
    if let Some(keyword) = keyword {
        info!("Grant name query detected: '{}'", keyword);
    }
    keyword
}

#[must_use]
pub fn title_matches(candidate: &Candidate, keyword: &str) -> bool {
    candidate.title().to_lowercase().contains(keyword)
}

/// Split candidates into (title matches, others), preserving order
pub fn partition(candidates: Vec<Candidate>, keyword: &str) -> (Vec<Candidate>, Vec<Candidate>) {
    candidates
        .into_iter()
        .partition(|candidate| title_matches(candidate, keyword))
}

/// Matches first, then tiered picks while room remains under `max`.
/// With no matches the tiered picks pass through untouched.
pub fn merge_after_tiering(
    matches: Vec<Candidate>,
    tiered: Vec<Candidate>,
    max: usize,
) -> Vec<Candidate> {
    if matches.is_empty() {
        return tiered;
    }
    let mut shortlist = matches;
    shortlist.truncate(max);
    let room = max.saturating_sub(shortlist.len());
    let extra: Vec<Candidate> = tiered
        .into_iter()
        .filter(|candidate| {
            !shortlist
                .iter()
                .any(|kept| kept.grant_id() == candidate.grant_id())
        })
        .take(room)
        .collect();
    shortlist.extend(extra);
    shortlist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrantRecord;

    fn candidate(id: &str, title: &str) -> Candidate {
        let record = GrantRecord {
            id: id.to_string(),
            source: "innovate_uk".to_string(),
            title: title.to_string(),
            url: String::new(),
            description: String::new(),
            funding_amount: None,
            deadline: None,
            opens_at: None,
            is_active: true,
            tags: vec![],
        };
        Candidate::new(record, 0.7)
    }

    fn pool() -> Vec<Candidate> {
        vec![
            candidate("a", "Biomedical Catalyst: early stage"),
            candidate("b", "Smart Grants August"),
            candidate("c", "Biomedical Catalyst: late stage"),
            candidate("d", "NIHR i4i Connect"),
        ]
    }

    #[test]
    fn test_detects_first_keyword() {
        assert_eq!(
            detect_name_query("Tell me about the Biomedical Catalyst"),
            Some("biomedical catalyst")
        );
        assert_eq!(detect_name_query("any i4i calls?"), Some("i4i"));
        assert_eq!(detect_name_query("funding for robotics"), None);
    }

    #[test]
    fn test_all_matches_surface() {
        let (matches, others) = partition(pool(), "biomedical catalyst");
        assert_eq!(matches.len(), 2);
        let shortlist = merge_after_tiering(matches, others, 3);
        let ids: Vec<&str> = shortlist.iter().map(Candidate::grant_id).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_no_matches_pass_through() {
        let (matches, others) = partition(pool(), "eureka");
        assert!(matches.is_empty());
        assert_eq!(merge_after_tiering(matches, others.clone(), 10), others);
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let keyword = "biomedical catalyst";
        let (matches, others) = partition(pool(), keyword);
        let once = merge_after_tiering(matches, others, 3);
        let (matches, others) = partition(once.clone(), keyword);
        let twice = merge_after_tiering(matches, others, 3);
        assert_eq!(once, twice);
    }
}
