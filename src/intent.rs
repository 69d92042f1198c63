//! Two-stage intent routing: a language-model classification followed by
//! deterministic follow-up overrides

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::RegexSet;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::llm::IntentClassifier;
use crate::models::Intent;
use crate::session::ConversationContext;

/// Phrases that mark a question about grants already on screen
const FOLLOWUP_PATTERNS: &[&str] = &[
    r"what are the dates\??",
    r"what are the deadlines\??",
    r"what's the deadline",
    r"when does (it|this) close\??",
    r"when do (they|these|those) close\??",
    r"how much funding",
    r"what's the budget",
    r"who can apply",
    r"what are the requirements",
    r"how do i apply",
    r"tell me more",
    r"what about",
    r"what are the dates for (this|these|that|those)\??",
    r"what's the funding",
    r"how much can i get",
];

static FOLLOWUP_SET: LazyLock<Option<RegexSet>> =
    LazyLock::new(|| RegexSet::new(FOLLOWUP_PATTERNS).ok());

const QUESTION_WORDS: &[&str] = &["what", "when", "how", "who", "which", "where"];
const PRONOUNS: &[&str] = &["this", "that", "these", "those", "it", "they", "them"];
const SHORT_QUESTION_WORDS: usize = 10;

/// Raw classifier verdict before overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryIntent {
    pub intent: Intent,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub referenced_grant_names: Vec<String>,
}

impl PrimaryIntent {
    /// Verdict used when the classifier is unavailable
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Discovery,
            confidence: 0.0,
            reasoning: "classifier unavailable".to_string(),
            referenced_grant_names: Vec::new(),
        }
    }
}

/// Final routing decision for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: Intent,
    pub confidence: f32,
    pub referenced_grant_names: Vec<String>,
    pub overridden: bool,
}

pub fn matches_followup_pattern(query: &str) -> bool {
    let normalized = query.trim().to_lowercase();
    FOLLOWUP_SET
        .as_ref()
        .is_some_and(|set| set.is_match(&normalized))
}

/// "when do these close?"-style questions right after an assistant reply
pub fn is_short_pronoun_question(query: &str, context: &ConversationContext) -> bool {
    let normalized = query.trim().to_lowercase();
    let words: Vec<&str> = normalized
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .collect();
    if words.is_empty() || words.len() > SHORT_QUESTION_WORDS {
        return false;
    }
    let starts_with_question = QUESTION_WORDS.iter().any(|qw| normalized.starts_with(qw));
    let has_pronoun = words.iter().any(|word| PRONOUNS.contains(word));
    starts_with_question && has_pronoun && context.last_message_is_assistant()
}

/// Deterministic override rules. Every rule only ever yields `followup`,
/// so the result does not depend on rule order and re-applying is a no-op.
pub fn apply_overrides(primary: Intent, query: &str, context: &ConversationContext) -> Intent {
    if primary == Intent::Followup || !context.has_discussed_grants() {
        return primary;
    }
    if matches_followup_pattern(query) || is_short_pronoun_question(query, context) {
        return Intent::Followup;
    }
    if query.to_lowercase().contains("tell me more") {
        return Intent::Followup;
    }
    primary
}

/// Routes a query to an intent using the classifier plus overrides
#[derive(Clone)]
pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
    timeout: Duration,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn IntentClassifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
        }
    }

    /// Classify `query`; classifier failures fall back to discovery
    pub async fn classify(&self, query: &str, context: &ConversationContext) -> IntentDecision {
        let primary =
            match tokio::time::timeout(self.timeout, self.classifier.classify(query, context)).await
            {
                Ok(Ok(primary)) => primary,
                Ok(Err(e)) => {
                    warn!("Intent classification failed: {}", e);
                    PrimaryIntent::fallback()
                }
                Err(_) => {
                    warn!(
                        "Intent classification timed out after {}s",
                        self.timeout.as_secs()
                    );
                    PrimaryIntent::fallback()
                }
            };

        let intent = apply_overrides(primary.intent, query, context);
        let overridden = intent != primary.intent;
        if overridden {
            info!(
                "Pattern-based override: changing intent from '{}' to '{}'",
                primary.intent, intent
            );
        }

        IntentDecision {
            intent,
            confidence: primary.confidence,
            referenced_grant_names: primary.referenced_grant_names,
            overridden,
        }
    }
}
