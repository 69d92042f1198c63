//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::models::GrantReference;
use crate::models::Intent;
use crate::models::Message;
use crate::models::Profile;
use crate::models::Role;
use crate::rag::ChatOutcome;
use crate::rag::SearchRequest;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// A prior turn supplied by the client
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub role: Role,
    pub content: String,
}

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

fn default_top_k() -> usize {
    10
}

/// Upper bound for a chat request's `top_k`
pub const MAX_TOP_K: usize = 20;

const fn default_active_only() -> bool {
    true
}

impl ChatRequest {
    /// Pipeline request under a resolved session id
    pub fn into_search(self, session_id: String) -> SearchRequest {
        SearchRequest {
            query: self.message.trim().to_string(),
            session_id,
            history: self
                .history
                .into_iter()
                .map(|item| Message::new(item.role, item.content))
                .collect(),
            top_k: Some(self.top_k.clamp(1, MAX_TOP_K)),
            active_only: self.active_only,
            sources: self.sources.filter(|sources| !sources.is_empty()),
        }
    }
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub answer: String,
    pub grants: Vec<GrantReference>,
    pub intent: Intent,
    pub no_match: bool,
    pub profile: Profile,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            session_id: outcome.session_id,
            answer: outcome.answer,
            grants: outcome.grants,
            intent: outcome.intent,
            no_match: outcome.no_match,
            profile: outcome.profile,
        }
    }
}

/// Events of the streaming chat endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Token {
        content: String,
    },
    Error {
        message: String,
    },
    Grants {
        session_id: String,
        grants: Vec<GrantReference>,
        intent: Intent,
        no_match: bool,
    },
    Done,
}

impl StreamEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
            Self::Grants { .. } => "grants",
            Self::Done => "done",
        }
    }
}

/// Grant listing query parameters
#[derive(Debug, Deserialize)]
pub struct GrantListQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Upper bound for `GET /api/grants`
pub const MAX_LIST_LIMIT: usize = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(request.top_k, 10);
        assert!(request.active_only);
        assert!(request.session_id.is_none());

        let search = request.into_search("s1".to_string());
        assert_eq!(search.top_k, Some(10));
        assert!(search.sources.is_none());
    }

    #[test]
    fn test_top_k_is_clamped() {
        let huge = format!(r#"{{"message": "hi", "top_k": {}}}"#, usize::MAX);
        let request: ChatRequest = serde_json::from_str(&huge).unwrap();
        assert_eq!(request.into_search("s1".to_string()).top_k, Some(MAX_TOP_K));

        let zero: ChatRequest = serde_json::from_str(r#"{"message": "hi", "top_k": 0}"#).unwrap();
        assert_eq!(zero.into_search("s1".to_string()).top_k, Some(1));
    }

    #[test]
    fn test_history_becomes_messages() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"message": " what about it? ", "history": [
                {"role": "user", "content": "Smart grants?"},
                {"role": "assistant", "content": "See innovate_uk_1"}
            ], "sources": []}"#,
        )
        .unwrap();
        let search = request.into_search("s1".to_string());
        assert_eq!(search.query, "what about it?");
        assert_eq!(search.history.len(), 2);
        assert_eq!(search.history[1].role, Role::Assistant);
        assert!(search.sources.is_none());
    }

    #[test]
    fn test_stream_event_wire_format() {
        let token = serde_json::to_value(StreamEvent::Token {
            content: "Hi".to_string(),
        })
        .unwrap();
        assert_eq!(token, serde_json::json!({"type": "token", "content": "Hi"}));
        assert_eq!(
            serde_json::to_value(StreamEvent::Done).unwrap(),
            serde_json::json!({"type": "done"})
        );
        assert_eq!(StreamEvent::Done.name(), "done");
    }
}
