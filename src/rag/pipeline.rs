//! Complete grant search turn: profile -> intent -> sources -> rank -> advise

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::config::PolicyName;
use crate::config::RankingConfig;
use crate::database::Database;
use crate::database::PgGrantRepository;
use crate::database::PgVectorRetriever;
use crate::embeddings::EmbeddingClient;
use crate::errors::Result;
use crate::intent::IntentDecision;
use crate::intent::IntentRouter;
use crate::llm::AdviceGenerator;
use crate::llm::AdviceRequest;
use crate::llm::IntentClassifier;
use crate::llm::LlmService;
use crate::llm::ProfileExtractor;
use crate::llm::StreamingResponse;
use crate::models::Candidate;
use crate::models::GrantReference;
use crate::models::Intent;
use crate::models::MatchStrength;
use crate::models::Message;
use crate::models::Profile;
use crate::rag::aggregator::RecordFilter;
use crate::rag::assembler::NameQuery;
use crate::rag::assembler::ResponseAssembler;
use crate::rag::boost::ScoreAdjuster;
use crate::rag::eligibility::EligibilityEngine;
use crate::rag::name_filter;
use crate::rag::retriever::GrantRepository;
use crate::rag::retriever::Retriever;
use crate::rag::retriever::VectorRetriever;
use crate::rag::selection::combine_scores;
use crate::rag::selection::TieringSelector;
use crate::rag::sources::CandidateSources;
use crate::rag::sources::SourceMode;
use crate::rag::sources::SourceRequest;
use crate::session::ConversationStore;

pub const EMPTY_QUERY_ANSWER: &str = "Ask me something about funding.";
pub const APOLOGY_ANSWER: &str =
    "Sorry, I couldn't put together advice just now. Please try again in a moment.";
pub const NO_MATCH_ANSWER: &str = "I couldn't find any open grants that match this query and your eligibility. \
Could you tell me more about your organisation, your sector or the amount of funding you need?";

/// One chat turn as requested by a client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub session_id: String,
    /// Client-held history, used when the session has no messages yet
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

/// Result of one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub session_id: String,
    pub answer: String,
    /// Cards shown to the user
    pub grants: Vec<GrantReference>,
    /// Full ranked shortlist
    pub shortlist: Vec<GrantReference>,
    pub intent: Intent,
    pub profile: Profile,
    pub no_match: bool,
}

/// A ranked turn waiting for its answer. Holds the session lock until
/// [`GrantSearchService::finish`] consumes it.
pub struct PreparedTurn {
    _guard: OwnedMutexGuard<()>,
    pub session_id: String,
    pub query: String,
    pub decision: IntentDecision,
    pub profile: Profile,
    pub shortlist: Vec<Candidate>,
    pub cards: Vec<GrantReference>,
    pub advice: AdviceRequest,
}

impl PreparedTurn {
    #[must_use]
    pub fn no_match(&self) -> bool {
        self.shortlist.is_empty()
    }
}

/// External collaborators the service is assembled from
#[derive(Clone)]
pub struct Collaborators {
    pub vector: Arc<dyn VectorRetriever>,
    pub repository: Arc<dyn GrantRepository>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn ProfileExtractor>,
    pub advisor: Arc<dyn AdviceGenerator>,
    pub store: Arc<dyn ConversationStore>,
}

/// Conversation-aware grant search
pub struct GrantSearchService {
    store: Arc<dyn ConversationStore>,
    extractor: Arc<dyn ProfileExtractor>,
    advisor: Arc<dyn AdviceGenerator>,
    router: IntentRouter,
    sources: CandidateSources,
    adjuster: ScoreAdjuster,
    eligibility: EligibilityEngine,
    selector: TieringSelector,
    assembler: ResponseAssembler,
    ranking: RankingConfig,
    default_top_k: usize,
    llm_timeout: Duration,
}

impl GrantSearchService {
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Result<Self> {
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
        let retriever = Retriever::new(
            collaborators.vector,
            collaborators.repository,
            Duration::from_secs(config.retrieval.timeout_secs),
        );

        Ok(Self {
            router: IntentRouter::new(collaborators.classifier, llm_timeout),
            sources: CandidateSources::new(retriever, config.retrieval.clone())?,
            assembler: ResponseAssembler::new(collaborators.store.clone(), &config.ranking),
            store: collaborators.store,
            extractor: collaborators.extractor,
            advisor: collaborators.advisor,
            adjuster: ScoreAdjuster::default(),
            eligibility: EligibilityEngine,
            selector: TieringSelector::new(
                config.ranking.max_shortlist,
                config.ranking.diversity_weight,
            ),
            ranking: config.ranking.clone(),
            default_top_k: config.retrieval.default_top_k,
            llm_timeout,
        })
    }

    /// Wire the Postgres, pgvector and chat-completions adapters
    pub async fn from_config(config: &AppConfig, store: Arc<dyn ConversationStore>) -> Result<Self> {
        let database = Arc::new(Database::from_config(config).await?);
        let embeddings = Arc::new(EmbeddingClient::from_config(&config.embeddings)?);
        let llm = Arc::new(LlmService::new(config)?);

        Self::new(
            config,
            Collaborators {
                vector: Arc::new(PgVectorRetriever::new(database.clone(), embeddings)),
                repository: Arc::new(PgGrantRepository::new(database)),
                classifier: llm.clone(),
                extractor: llm.clone(),
                advisor: llm,
                store,
            },
        )
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn GrantRepository> {
        self.sources.retriever().repository()
    }

    /// Run a full turn and wait for the complete answer
    pub async fn chat(&self, request: SearchRequest) -> Result<ChatOutcome> {
        if request.query.trim().is_empty() {
            return Ok(Self::empty_query_outcome(request.session_id));
        }
        let turn = self.prepare(request).await?;

        let answer = match tokio::time::timeout(self.llm_timeout, self.advisor.generate(&turn.advice))
            .await
        {
            Ok(Ok(answer)) if !answer.trim().is_empty() => answer,
            Ok(Ok(_)) => Self::fallback_answer(turn.no_match()).to_string(),
            Ok(Err(e)) => {
                warn!("Advice generation failed: {}", e);
                Self::fallback_answer(turn.no_match()).to_string()
            }
            Err(_) => {
                warn!("Advice generation timed out");
                Self::fallback_answer(turn.no_match()).to_string()
            }
        };

        self.finish(turn, answer).await
    }

    /// Rank a turn and open the answer stream. The caller forwards the
    /// chunks and hands the collected text to [`Self::finish`].
    pub async fn chat_stream(
        &self,
        request: SearchRequest,
    ) -> Result<(PreparedTurn, StreamingResponse)> {
        let turn = self.prepare(request).await?;
        let stream = match tokio::time::timeout(
            self.llm_timeout,
            self.advisor.generate_stream(&turn.advice),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("Advice stream failed to start: {}", e);
                StreamingResponse::from_text(Self::fallback_answer(turn.no_match()))
            }
            Err(_) => {
                warn!("Advice stream timed out before the first byte");
                StreamingResponse::from_text(Self::fallback_answer(turn.no_match()))
            }
        };
        Ok((turn, stream))
    }

    /// Record the turn and release the session
    pub async fn finish(&self, turn: PreparedTurn, answer: String) -> Result<ChatOutcome> {
        self.assembler
            .record_turn(
                &turn.session_id,
                &turn.query,
                &answer,
                &turn.shortlist,
                turn.decision.intent,
            )
            .await?;

        let no_match = turn.no_match();
        Ok(ChatOutcome {
            session_id: turn.session_id,
            answer,
            grants: turn.cards,
            shortlist: turn.shortlist.iter().map(GrantReference::from).collect(),
            intent: turn.decision.intent,
            profile: turn.profile,
            no_match,
        })
    }

    /// Everything up to the advisor call, under the session lock
    pub async fn prepare(&self, request: SearchRequest) -> Result<PreparedTurn> {
        let SearchRequest {
            query,
            session_id,
            history,
            top_k,
            active_only,
            sources,
        } = request;
        info!("Processing query for session {}: {}", session_id, query);

        let guard = self.store.lock(&session_id).await.lock_owned().await;

        let mut context = self.store.context(&session_id).await?;
        if context.messages.is_empty() && !history.is_empty() {
            debug!("Session {} has no messages, using supplied history", session_id);
            context.messages = history;
        }

        let update = match tokio::time::timeout(
            self.llm_timeout,
            self.extractor.extract(&query, &context.profile),
        )
        .await
        {
            Ok(Ok(update)) => update,
            Ok(Err(e)) => {
                warn!("Profile extraction failed, keeping profile: {}", e);
                Profile::default()
            }
            Err(_) => {
                warn!("Profile extraction timed out, keeping profile");
                Profile::default()
            }
        };
        context.profile = self.store.merge_profile(&session_id, update).await?;

        let decision = self.router.classify(&query, &context).await;
        info!(
            "Query intent: {}, confidence: {:.2}",
            decision.intent, decision.confidence
        );

        let filter = RecordFilter {
            active_only,
            sources,
        };
        let source_request = SourceRequest {
            intent: decision.intent,
            query: &query,
            referenced_names: &decision.referenced_grant_names,
            context: &context,
            top_k: top_k.unwrap_or(self.default_top_k),
            filter: &filter,
        };
        let (mode, mut candidates) = match self.sources.select(&source_request).await {
            Ok(sourced) => (sourced.mode, sourced.candidates),
            Err(e) if e.is_upstream() => {
                warn!("Candidate sourcing failed, continuing without grants: {}", e);
                (SourceMode::Retrieval, Vec::new())
            }
            Err(e) => return Err(e),
        };
        debug!("Sourced {} candidates ({:?})", candidates.len(), mode);

        self.adjuster.adjust(&query, &mut candidates);
        let (shortlist, name_query) = self.rank(&query, candidates, &context.profile, mode);

        let cards = self
            .assembler
            .cards(decision.intent, name_query, &shortlist);
        let advice = AdviceRequest {
            query: query.clone(),
            intent: decision.intent,
            grants: self.assembler.advisor_grants(&shortlist, name_query),
            profile: context.profile.clone(),
            history: context.messages.clone(),
            discussed_grants: context.recent_distinct_grants(5),
            no_match: shortlist.is_empty(),
        };

        Ok(PreparedTurn {
            _guard: guard,
            session_id,
            query,
            decision,
            profile: context.profile,
            shortlist,
            cards,
            advice,
        })
    }

    /// Name partition, eligibility, blending and tiering
    fn rank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        profile: &Profile,
        mode: SourceMode,
    ) -> (Vec<Candidate>, NameQuery) {
        let policy_name = match mode {
            SourceMode::Carryover | SourceMode::Named => self.ranking.followup_policy,
            SourceMode::Retrieval => self.ranking.discovery_policy,
        };
        let policy = self.ranking.policy(policy_name);
        let has_profile = !profile.is_empty();
        let max = self.selector.max_shortlist();

        let keyword = name_filter::detect_name_query(query);
        let (matches, others) = match keyword {
            Some(keyword) => name_filter::partition(candidates, keyword),
            None => (Vec::new(), candidates),
        };

        let mut matches = self.eligibility.apply(matches, profile);
        let mut others = self.eligibility.apply(others, profile);
        combine_scores(&mut matches, has_profile, self.ranking.profile_weight);
        combine_scores(&mut others, has_profile, self.ranking.profile_weight);

        let tiered = self
            .selector
            .select(&others, policy, Utc::now())
            .into_candidates();

        if matches.is_empty() {
            let name_query = if keyword.is_some() {
                NameQuery::Unmatched
            } else {
                NameQuery::None
            };
            return (tiered, name_query);
        }

        matches.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        for candidate in &mut matches {
            candidate.strength = Some(if candidate.combined_score >= policy.strong {
                MatchStrength::Strong
            } else {
                MatchStrength::Stretch
            });
        }
        let shortlist = name_filter::merge_after_tiering(matches, tiered, max);
        let matched = keyword.map_or(0, |keyword| {
            shortlist
                .iter()
                .filter(|candidate| name_filter::title_matches(candidate, keyword))
                .count()
        });
        info!(
            "Policy {:?}: {} grants shortlisted, {} by programme name",
            policy_name,
            shortlist.len(),
            matched
        );
        (shortlist, NameQuery::Matched(matched))
    }

    /// Canned answer used when the advisor produces nothing
    #[must_use]
    pub const fn fallback_answer(no_match: bool) -> &'static str {
        if no_match {
            NO_MATCH_ANSWER
        } else {
            APOLOGY_ANSWER
        }
    }

    fn empty_query_outcome(session_id: String) -> ChatOutcome {
        ChatOutcome {
            session_id,
            answer: EMPTY_QUERY_ANSWER.to_string(),
            grants: Vec::new(),
            shortlist: Vec::new(),
            intent: Intent::Clarification,
            profile: Profile::default(),
            no_match: true,
        }
    }
}
