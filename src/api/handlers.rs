//! API request handlers

use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::Json;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::types::*;
use crate::models::GrantRecord;
use crate::rag::pipeline::APOLOGY_ANSWER;
use crate::rag::pipeline::EMPTY_QUERY_ANSWER;
use crate::rag::GrantSearchService;
use crate::rag::SearchRequest;
use crate::session::SessionSnapshot;

const INTERRUPTED_MESSAGE: &str = "The answer was interrupted before it finished.";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GrantSearchService>,
}

/// Health check handler
pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Client-supplied session id, or a fresh one
fn resolve_session_id(session_id: Option<&str>) -> String {
    session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string)
}

/// Chat turn (POST /api/chat)
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ApiResponse<ChatResponse>> {
    let session_id = resolve_session_id(req.session_id.as_deref());
    info!("POST /api/chat (session {})", session_id);

    match state.service.chat(req.into_search(session_id)).await {
        Ok(outcome) => Json(ApiResponse::success(outcome.into())),
        Err(e) => {
            error!("Chat turn failed: {}", e);
            Json(ApiResponse::error(APOLOGY_ANSWER))
        }
    }
}

/// Streaming chat turn (POST /api/chat/stream)
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let session_id = resolve_session_id(req.session_id.as_deref());
    info!("POST /api/chat/stream (session {})", session_id);

    let (tx, rx) = mpsc::channel::<StreamEvent>(64);
    let service = state.service.clone();
    let request = req.into_search(session_id);
    tokio::spawn(async move {
        stream_turn(&service, request, &tx).await;
        let _ = tx.send(StreamEvent::Done).await;
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let frame = Event::default().event(event.name()).json_data(&event);
        Some((frame, rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Drive one streamed turn, forwarding events until the grants are sent.
/// Once the client is gone the answer stream is dropped and the turn is
/// recorded with the text received so far.
async fn stream_turn(
    service: &GrantSearchService,
    request: SearchRequest,
    tx: &mpsc::Sender<StreamEvent>,
) {
    if request.query.is_empty() {
        let _ = tx
            .send(StreamEvent::Token {
                content: EMPTY_QUERY_ANSWER.to_string(),
            })
            .await;
        return;
    }

    let (turn, stream) = match service.chat_stream(request).await {
        Ok(started) => started,
        Err(e) => {
            error!("Streaming turn failed: {}", e);
            let _ = tx
                .send(StreamEvent::Token {
                    content: APOLOGY_ANSWER.to_string(),
                })
                .await;
            return;
        }
    };

    let mut answer = String::new();
    let mut chunks = stream.into_stream();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(text) => {
                answer.push_str(&text);
                if tx.send(StreamEvent::Token { content: text }).await.is_err() {
                    info!("Client disconnected, cancelling answer stream");
                    break;
                }
            }
            Err(e) => {
                warn!("Answer stream failed: {}", e);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: INTERRUPTED_MESSAGE.to_string(),
                    })
                    .await;
                break;
            }
        }
    }

    if answer.trim().is_empty() {
        answer = GrantSearchService::fallback_answer(turn.no_match()).to_string();
        let _ = tx
            .send(StreamEvent::Token {
                content: answer.clone(),
            })
            .await;
    }

    match service.finish(turn, answer).await {
        Ok(outcome) => {
            let _ = tx
                .send(StreamEvent::Grants {
                    session_id: outcome.session_id,
                    grants: outcome.grants,
                    intent: outcome.intent,
                    no_match: outcome.no_match,
                })
                .await;
        }
        Err(e) => error!("Failed to record streamed turn: {}", e),
    }
}

/// List grants (GET /api/grants)
pub async fn list_grants(
    State(state): State<AppState>,
    Query(params): Query<GrantListQuery>,
) -> Result<Json<ApiResponse<Vec<GrantRecord>>>, StatusCode> {
    info!("GET /api/grants: q={:?} limit={}", params.q, params.limit);

    let limit = params.limit.clamp(1, MAX_LIST_LIMIT);
    match state
        .service
        .repository()
        .list_grants(params.q.as_deref(), params.active_only, limit)
        .await
    {
        Ok(grants) => Ok(Json(ApiResponse::success(grants))),
        Err(e) => {
            error!("Error listing grants: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Session summary (GET /api/sessions/:id)
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, StatusCode> {
    info!("GET /api/sessions/{}", session_id);

    match state.service.store().snapshot(&session_id).await {
        Ok(Some(snapshot)) => Ok(Json(ApiResponse::success(snapshot))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Error reading session {}: {}", session_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::AppConfig;
    use crate::intent::PrimaryIntent;
    use crate::llm::AdviceGenerator;
    use crate::llm::AdviceRequest;
    use crate::llm::IntentClassifier;
    use crate::llm::ProfileExtractor;
    use crate::llm::StreamingResponse;
    use crate::models::Intent;
    use crate::models::Profile;
    use crate::models::SearchHit;
    use crate::rag::Collaborators;
    use crate::rag::GrantRepository;
    use crate::rag::VectorRetriever;
    use crate::session::ConversationContext;
    use crate::session::ConversationStore;
    use crate::session::InMemoryConversationStore;
    use crate::Result;

    struct Empty;

    #[async_trait]
    impl VectorRetriever for Empty {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl GrantRepository for Empty {
        async fn get_grants_by_ids(&self, _ids: &[String]) -> Result<Vec<GrantRecord>> {
            Ok(vec![])
        }

        async fn list_grants(
            &self,
            _filter: Option<&str>,
            _active_only: bool,
            _limit: usize,
        ) -> Result<Vec<GrantRecord>> {
            Ok(vec![])
        }

        async fn find_by_title(&self, _fragment: &str, _limit: usize) -> Result<Vec<GrantRecord>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl IntentClassifier for Empty {
        async fn classify(&self, _query: &str, _context: &ConversationContext) -> Result<PrimaryIntent> {
            Ok(PrimaryIntent::fallback())
        }
    }

    #[async_trait]
    impl ProfileExtractor for Empty {
        async fn extract(&self, _message: &str, _existing: &Profile) -> Result<Profile> {
            Ok(Profile::default())
        }
    }

    /// Advisor whose stream never ends on its own
    struct Endless;

    #[async_trait]
    impl AdviceGenerator for Endless {
        async fn generate(&self, _request: &AdviceRequest) -> Result<String> {
            Ok(String::new())
        }

        async fn generate_stream(&self, _request: &AdviceRequest) -> Result<StreamingResponse> {
            Ok(StreamingResponse::new(Box::pin(futures::stream::repeat_with(
                || Ok("Hello ".to_string()),
            ))))
        }
    }

    #[test]
    fn test_resolve_session_id() {
        assert_eq!(resolve_session_id(Some(" abc ")), "abc");
        let generated = resolve_session_id(Some("  "));
        assert!(uuid::Uuid::parse_str(&generated).is_ok());
        assert!(uuid::Uuid::parse_str(&resolve_session_id(None)).is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_stops_stream_and_records_partial_answer() {
        let store = Arc::new(InMemoryConversationStore::default());
        let service = GrantSearchService::new(
            &AppConfig::default(),
            Collaborators {
                vector: Arc::new(Empty),
                repository: Arc::new(Empty),
                classifier: Arc::new(Empty),
                extractor: Arc::new(Empty),
                advisor: Arc::new(Endless),
                store: store.clone(),
            },
        )
        .unwrap();

        let (tx, rx) = mpsc::channel::<StreamEvent>(1);
        drop(rx);
        let request = SearchRequest {
            query: "net zero".to_string(),
            session_id: "s1".to_string(),
            ..SearchRequest::default()
        };
        stream_turn(&service, request, &tx).await;

        let context = store.context("s1").await.unwrap();
        assert_eq!(context.messages.len(), 2);
        assert_eq!(context.messages[1].content, "Hello ");
        assert_eq!(context.last_intent, Some(Intent::Discovery));
    }
}
