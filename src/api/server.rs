//! HTTP server implementation

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::rag::GrantSearchService;
use crate::session::InMemoryConversationStore;
use crate::Result;

/// Maximum in-flight requests
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// Build the application router around a ready service
pub fn build_router(state: AppState, request_timeout: Duration, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS));

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    app
}

/// Start the API server
pub async fn serve_api(config: &AppConfig, host: String, port: u16, enable_cors: bool) -> Result<()> {
    info!("Starting GrantScout API server...");

    let store = Arc::new(InMemoryConversationStore::new(config.session.timeout_secs));
    let sweeper = store.spawn_cleanup(Duration::from_secs(config.session.sweep_interval_secs));
    let service = Arc::new(GrantSearchService::from_config(config, store).await?);

    let app = build_router(
        AppState { service },
        Duration::from_secs(config.server.request_timeout_secs),
        enable_cors,
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health          - Health check");
    info!("  POST /api/chat            - Chat turn");
    info!("  POST /api/chat/stream     - Chat turn (server-sent events)");
    info!("  GET  /api/grants          - List grants");
    info!("  GET  /api/sessions/:id    - Session summary");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
