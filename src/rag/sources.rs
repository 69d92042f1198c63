//! Candidate source selection: which grants enter the ranking pool for a turn

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;
use tracing::info;

use crate::config::RetrievalConfig;
use crate::errors::GrantScoutError;
use crate::errors::Result;
use crate::models::Candidate;
use crate::models::Intent;
use crate::models::Message;
use crate::models::Role;
use crate::rag::aggregator::CandidateAggregator;
use crate::rag::aggregator::RecordFilter;
use crate::rag::retriever::Retriever;
use crate::session::ConversationContext;

/// Title matches kept per referenced grant name
const TITLE_MATCHES_PER_NAME: usize = 3;

/// How the pool for a turn was built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Grants named in a comparison, resolved by title
    Named,
    /// Grants carried over from earlier turns, possibly topped up
    Carryover,
    /// Fresh semantic retrieval
    Retrieval,
}

/// Inputs for one sourcing pass
#[derive(Debug, Clone)]
pub struct SourceRequest<'a> {
    pub intent: Intent,
    pub query: &'a str,
    pub referenced_names: &'a [String],
    pub context: &'a ConversationContext,
    pub top_k: usize,
    pub filter: &'a RecordFilter,
}

#[derive(Debug, Clone)]
pub struct SourcedCandidates {
    pub mode: SourceMode,
    pub candidates: Vec<Candidate>,
}

/// Builds the candidate pool according to the routed intent
#[derive(Clone)]
pub struct CandidateSources {
    retriever: Retriever,
    aggregator: CandidateAggregator,
    config: RetrievalConfig,
    grant_id_pattern: Regex,
}

impl CandidateSources {
    pub fn new(retriever: Retriever, config: RetrievalConfig) -> Result<Self> {
        let grant_id_pattern = Regex::new(&config.grant_id_pattern)
            .map_err(|e| GrantScoutError::Config(format!("retrieval.grant_id_pattern: {e}")))?;
        let aggregator = CandidateAggregator::new(retriever.repository().clone());
        Ok(Self {
            retriever,
            aggregator,
            config,
            grant_id_pattern,
        })
    }

    #[must_use]
    pub const fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn select(&self, request: &SourceRequest<'_>) -> Result<SourcedCandidates> {
        match request.intent {
            Intent::Followup => self.followup(request).await,
            Intent::Comparative if !request.referenced_names.is_empty() => {
                self.named(request).await
            }
            _ => Ok(SourcedCandidates {
                mode: SourceMode::Retrieval,
                candidates: self
                    .retrieve(
                        request.query,
                        self.fetch_limit(request.top_k),
                        request.filter,
                    )
                    .await?,
            }),
        }
    }

    /// Semantic retrieval aggregated into candidates
    /// Hits requested for a fresh retrieval of `top_k` grants
    fn fetch_limit(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.config.over_fetch_factor)
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<Candidate>> {
        let hits = self
            .retriever
            .search_or_recent(query, limit, filter.active_only)
            .await?;
        self.aggregator.aggregate(&hits, filter).await
    }

    async fn followup(&self, request: &SourceRequest<'_>) -> Result<SourcedCandidates> {
        let mut ids = request
            .context
            .recent_distinct_grants(self.config.followup_carryover);
        if ids.is_empty() {
            ids = self.history_grant_ids(&request.context.messages);
            if !ids.is_empty() {
                info!("Recovered {} grant ids from conversation history", ids.len());
            }
        }

        let mut candidates = self
            .aggregator
            .carryover(&ids, self.config.carryover_score, request.filter)
            .await?;
        info!(
            "Follow-up query, using {} grants from conversation history",
            candidates.len()
        );

        if candidates.len() < self.config.followup_min_candidates {
            debug!("Not enough context grants, adding retrieval results");
            let extra = self
                .retrieve(request.query, self.config.followup_topup, request.filter)
                .await?;
            append_new(&mut candidates, extra);
        }

        Ok(SourcedCandidates {
            mode: SourceMode::Carryover,
            candidates,
        })
    }

    async fn named(&self, request: &SourceRequest<'_>) -> Result<SourcedCandidates> {
        let repository = self.retriever.repository();
        let mut ids: Vec<String> = Vec::new();

        for name in request.referenced_names {
            let matches = repository
                .find_by_title(name, TITLE_MATCHES_PER_NAME)
                .await?;
            if matches.is_empty() {
                let hits = self.retriever.search_or_recent(name, 1, false).await?;
                match hits.into_iter().find_map(|hit| hit.grant_id) {
                    Some(id) => ids.push(id),
                    None => debug!("Could not resolve grant name '{}'", name),
                }
            } else {
                ids.extend(matches.into_iter().map(|record| record.id));
            }
        }

        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(id.clone()));

        if ids.is_empty() {
            return Ok(SourcedCandidates {
                mode: SourceMode::Retrieval,
                candidates: self
                    .retrieve(
                        request.query,
                        self.fetch_limit(request.top_k),
                        request.filter,
                    )
                    .await?,
            });
        }

        Ok(SourcedCandidates {
            mode: SourceMode::Named,
            candidates: self
                .aggregator
                .carryover(&ids, self.config.carryover_score, request.filter)
                .await?,
        })
    }

    /// Grant ids mentioned in the last few assistant messages, in order of
    /// first appearance, deduplicated and capped
    #[must_use]
    pub fn history_grant_ids(&self, messages: &[Message]) -> Vec<String> {
        let assistant: Vec<&Message> = messages
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .collect();
        let start = assistant.len().saturating_sub(self.config.history_scan);

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for message in &assistant[start..] {
            for found in self.grant_id_pattern.find_iter(&message.content) {
                let id = found.as_str().to_string();
                if seen.insert(id.clone()) {
                    ids.push(id);
                    if ids.len() == self.config.history_id_cap {
                        return ids;
                    }
                }
            }
        }
        ids
    }
}

/// Append candidates whose ids are not yet present, keeping existing order
fn append_new(candidates: &mut Vec<Candidate>, extra: Vec<Candidate>) {
    let mut present: HashSet<String> = candidates
        .iter()
        .map(|candidate| candidate.grant_id().to_string())
        .collect();
    candidates.extend(
        extra
            .into_iter()
            .filter(|candidate| present.insert(candidate.grant_id().to_string())),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::models::GrantRecord;
    use crate::models::SearchHit;
    use crate::rag::retriever::GrantRepository;
    use crate::rag::retriever::VectorRetriever;

    fn record(id: &str) -> GrantRecord {
        GrantRecord {
            id: id.to_string(),
            source: "nihr".to_string(),
            title: format!("Programme {id}"),
            url: String::new(),
            description: String::new(),
            funding_amount: None,
            deadline: None,
            opens_at: None,
            is_active: true,
            tags: vec![],
        }
    }

    struct Repo;

    #[async_trait]
    impl GrantRepository for Repo {
        async fn get_grants_by_ids(&self, ids: &[String]) -> Result<Vec<GrantRecord>> {
            Ok(ids.iter().map(|id| record(id)).collect())
        }

        async fn list_grants(
            &self,
            _filter: Option<&str>,
            _active_only: bool,
            _limit: usize,
        ) -> Result<Vec<GrantRecord>> {
            Ok(vec![])
        }

        async fn find_by_title(&self, fragment: &str, _limit: usize) -> Result<Vec<GrantRecord>> {
            Ok(if fragment == "i4i" {
                vec![record("nihr_i4i_pdA"), record("nihr_i4i_connect")]
            } else {
                vec![]
            })
        }
    }

    struct Vectors;

    #[async_trait]
    impl VectorRetriever for Vectors {
        async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
            Ok(["innovate_uk_a", "nihr_1", "innovate_uk_b", "innovate_uk_c"]
                .iter()
                .take(top_k)
                .map(|id| SearchHit::new(*id, 0.7))
                .collect())
        }
    }

    fn sources() -> CandidateSources {
        let retriever = Retriever::new(Arc::new(Vectors), Arc::new(Repo), Duration::from_secs(1));
        CandidateSources::new(retriever, RetrievalConfig::default()).unwrap()
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(Candidate::grant_id).collect()
    }

    #[test]
    fn test_history_ids_in_order_of_appearance() {
        let messages = vec![
            Message::new(Role::Assistant, "Old: nihr_999"),
            Message::new(Role::Assistant, "See nihr_1 and innovate_uk_42."),
            Message::new(Role::User, "and nihr_77?"),
            Message::new(Role::Assistant, "Also nihr_1, ukri_5"),
            Message::new(Role::Assistant, "Finally innovate_uk_42 and nihr_3"),
        ];
        assert_eq!(
            sources().history_grant_ids(&messages),
            vec!["nihr_1", "innovate_uk_42", "ukri_5", "nihr_3"]
        );
    }

    #[test]
    fn test_history_ids_are_capped() {
        let content: Vec<String> = (0..15).map(|i| format!("nihr_{i}")).collect();
        let messages = vec![Message::new(Role::Assistant, content.join(" "))];
        assert_eq!(sources().history_grant_ids(&messages).len(), 10);
    }

    #[tokio::test]
    async fn test_followup_tops_up_without_duplicates() {
        let context = ConversationContext {
            discussed_grants: vec!["nihr_1".to_string()],
            ..ConversationContext::default()
        };
        let filter = RecordFilter::default();
        let request = SourceRequest {
            intent: Intent::Followup,
            query: "what are the deadlines",
            referenced_names: &[],
            context: &context,
            top_k: 10,
            filter: &filter,
        };
        let sourced = sources().select(&request).await.unwrap();
        assert_eq!(sourced.mode, SourceMode::Carryover);
        assert_eq!(
            ids(&sourced.candidates),
            vec!["nihr_1", "innovate_uk_a", "innovate_uk_b"]
        );
        assert_eq!(sourced.candidates[0].base_score, 1.0);
    }

    #[tokio::test]
    async fn test_comparative_resolves_titles_then_retrieval() {
        let context = ConversationContext::default();
        let filter = RecordFilter::default();
        let names = vec!["i4i".to_string(), "Unknown Fund".to_string()];
        let request = SourceRequest {
            intent: Intent::Comparative,
            query: "compare i4i with the other one",
            referenced_names: &names,
            context: &context,
            top_k: 10,
            filter: &filter,
        };
        let sourced = sources().select(&request).await.unwrap();
        assert_eq!(sourced.mode, SourceMode::Named);
        assert_eq!(
            ids(&sourced.candidates),
            vec!["nihr_i4i_pdA", "nihr_i4i_connect", "innovate_uk_a"]
        );
    }

    #[tokio::test]
    async fn test_huge_top_k_saturates() {
        let context = ConversationContext::default();
        let filter = RecordFilter::default();
        let request = SourceRequest {
            intent: Intent::Discovery,
            query: "net zero",
            referenced_names: &[],
            context: &context,
            top_k: usize::MAX,
            filter: &filter,
        };
        assert_eq!(sources().fetch_limit(usize::MAX), usize::MAX);
        let sourced = sources().select(&request).await.unwrap();
        assert_eq!(sourced.candidates.len(), 4);
    }

    #[tokio::test]
    async fn test_discovery_over_fetches() {
        let context = ConversationContext::default();
        let filter = RecordFilter::default();
        let request = SourceRequest {
            intent: Intent::Discovery,
            query: "net zero",
            referenced_names: &[],
            context: &context,
            top_k: 2,
            filter: &filter,
        };
        let sourced = sources().select(&request).await.unwrap();
        assert_eq!(sourced.mode, SourceMode::Retrieval);
        assert_eq!(sourced.candidates.len(), 4);
    }
}
