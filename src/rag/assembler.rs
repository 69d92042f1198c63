//! Response assembly: card counts, advisor hand-off caps and the store update

use std::sync::Arc;

use tracing::info;

use crate::config::RankingConfig;
use crate::errors::Result;
use crate::models::Candidate;
use crate::models::GrantReference;
use crate::models::Intent;
use crate::models::Message;
use crate::models::Role;
use crate::session::ConversationStore;

/// Grant ids recorded on the assistant message of a turn
pub const SURFACED_GRANTS: usize = 5;

/// Programme-name facts the assembler needs for card counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameQuery {
    None,
    Matched(usize),
    Unmatched,
}

/// Decides how much of the shortlist is shown and records the turn
#[derive(Clone)]
pub struct ResponseAssembler {
    store: Arc<dyn ConversationStore>,
    max_cards: usize,
    name_no_match_cards: usize,
    llm_grant_cap: usize,
    name_llm_grant_cap: usize,
}

impl ResponseAssembler {
    pub fn new(store: Arc<dyn ConversationStore>, ranking: &RankingConfig) -> Self {
        Self {
            store,
            max_cards: ranking.max_cards,
            name_no_match_cards: ranking.name_no_match_cards,
            llm_grant_cap: ranking.llm_grant_cap,
            name_llm_grant_cap: ranking.name_llm_grant_cap,
        }
    }

    /// Cards shown to the user; follow-ups show none since the user has
    /// already seen those grants
    #[must_use]
    pub fn card_count(&self, intent: Intent, name_query: NameQuery, shortlist_len: usize) -> usize {
        let wanted = match (intent, name_query) {
            (Intent::Followup, _) => 0,
            (_, NameQuery::Matched(n)) => n,
            (_, NameQuery::Unmatched) => self.name_no_match_cards,
            (_, NameQuery::None) => self.max_cards,
        };
        wanted.min(shortlist_len)
    }

    /// Head of the shortlist handed to the advisor
    #[must_use]
    pub fn advisor_grants(&self, shortlist: &[Candidate], name_query: NameQuery) -> Vec<Candidate> {
        let cap = if name_query == NameQuery::None {
            self.llm_grant_cap
        } else {
            self.name_llm_grant_cap
        };
        shortlist.iter().take(cap).cloned().collect()
    }

    #[must_use]
    pub fn cards(
        &self,
        intent: Intent,
        name_query: NameQuery,
        shortlist: &[Candidate],
    ) -> Vec<GrantReference> {
        let count = self.card_count(intent, name_query, shortlist.len());
        shortlist[..count].iter().map(GrantReference::from).collect()
    }

    /// Append the user and assistant turns and remember the intent
    pub async fn record_turn(
        &self,
        session_id: &str,
        query: &str,
        answer: &str,
        shortlist: &[Candidate],
        intent: Intent,
    ) -> Result<()> {
        let surfaced: Vec<String> = shortlist
            .iter()
            .take(SURFACED_GRANTS)
            .map(|candidate| candidate.grant_id().to_string())
            .collect();
        info!(
            "Recording turn for session {} ({} grants surfaced)",
            session_id,
            surfaced.len()
        );

        self.store
            .append_message(session_id, Message::new(Role::User, query))
            .await?;
        self.store
            .append_message(
                session_id,
                Message::new(Role::Assistant, answer).with_grants(surfaced),
            )
            .await?;
        self.store.set_intent(session_id, intent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GrantRecord;
    use crate::session::InMemoryConversationStore;

    fn assembler() -> ResponseAssembler {
        ResponseAssembler::new(
            Arc::new(InMemoryConversationStore::default()),
            &RankingConfig::default(),
        )
    }

    fn shortlist(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                Candidate::new(
                    GrantRecord {
                        id: format!("nihr_{i}"),
                        source: "nihr".to_string(),
                        title: format!("Grant {i}"),
                        url: String::new(),
                        description: String::new(),
                        funding_amount: None,
                        deadline: None,
                        opens_at: None,
                        is_active: true,
                        tags: vec![],
                    },
                    0.8,
                )
            })
            .collect()
    }

    #[test]
    fn test_card_count_table() {
        let a = assembler();
        let cases = [
            (Intent::Followup, NameQuery::Matched(3), 8, 0),
            (Intent::Followup, NameQuery::None, 8, 0),
            (Intent::Discovery, NameQuery::Matched(2), 8, 2),
            (Intent::Discovery, NameQuery::Unmatched, 8, 4),
            (Intent::Discovery, NameQuery::Unmatched, 3, 3),
            (Intent::Eligibility, NameQuery::None, 12, 10),
            (Intent::Strategic, NameQuery::None, 6, 6),
        ];
        for (intent, name, len, expected) in cases {
            assert_eq!(a.card_count(intent, name, len), expected, "{intent} {name:?}");
        }
    }

    #[test]
    fn test_advisor_caps() {
        let a = assembler();
        let list = shortlist(10);
        assert_eq!(a.advisor_grants(&list, NameQuery::None).len(), 5);
        assert_eq!(a.advisor_grants(&list, NameQuery::Matched(2)).len(), 8);
        assert_eq!(a.advisor_grants(&list, NameQuery::Unmatched).len(), 8);
    }

    #[tokio::test]
    async fn test_record_turn_stores_first_five() {
        let store = Arc::new(InMemoryConversationStore::default());
        let a = ResponseAssembler::new(store.clone(), &RankingConfig::default());
        a.record_turn("s", "q", "answer", &shortlist(7), Intent::Discovery)
            .await
            .unwrap();

        let context = store.context("s").await.unwrap();
        assert_eq!(context.messages.len(), 2);
        assert_eq!(context.messages[1].grants_mentioned.len(), 5);
        assert_eq!(context.discussed_grants[0], "nihr_0");
        assert_eq!(context.last_intent, Some(Intent::Discovery));
    }
}
