//! Command handlers

use std::path::Path;
use std::sync::Arc;

use crate::api::serve_api;
use crate::api::types::MAX_TOP_K;
use crate::cli::output::*;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::GrantIndexer;
use crate::rag::GrantSearchService;
use crate::rag::SearchRequest;
use crate::session::InMemoryConversationStore;
use crate::AppConfig;
use crate::Result;

pub async fn handle_serve(
    config: &AppConfig,
    host: Option<String>,
    port: Option<u16>,
    cors: bool,
) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    serve_api(config, host, port, cors || config.server.enable_cors).await
}

pub async fn handle_ask(
    config: &AppConfig,
    query: String,
    session: Option<String>,
    top_k: usize,
    all: bool,
    show_shortlist: bool,
) -> Result<()> {
    let store = Arc::new(InMemoryConversationStore::new(config.session.timeout_secs));
    let service = GrantSearchService::from_config(config, store).await?;

    let outcome = service
        .chat(SearchRequest {
            query: query.trim().to_string(),
            session_id: session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            top_k: Some(top_k.clamp(1, MAX_TOP_K)),
            active_only: !all,
            ..SearchRequest::default()
        })
        .await?;

    print_outcome(&outcome, show_shortlist);
    Ok(())
}

pub async fn handle_init(config: &AppConfig, force: bool) -> Result<()> {
    if !force {
        print_warning("This will create the grant tables and vector indexes.");
        print_warning("This operation is safe - it uses CREATE IF NOT EXISTS.");
        println!("\nUse --force to proceed.");
        return Ok(());
    }

    print_info("Initializing GrantScout database...");
    let database = Database::from_config(config).await?;
    if let Err(e) = database.init_schema(config.embeddings.dimension).await {
        if e.to_string().contains("vector") || e.to_string().contains("extension") {
            print_warning(&format!("Could not enable pgvector extension: {e}"));
            println!("  psql -c 'CREATE EXTENSION IF NOT EXISTS vector;'");
            println!("\nThen run: grantscout init --force");
        }
        return Err(e);
    }
    print_success("Schema initialized");
    Ok(())
}

pub async fn handle_import(config: &AppConfig, path: &Path) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    database.verify_schema_or_error().await?;
    let client = Arc::new(EmbeddingClient::from_config(&config.embeddings)?);

    print_info(&format!("Importing grants from {}", path.display()));
    let stats = GrantIndexer::new(database.clone(), client)
        .index_file(path)
        .await?;

    print_success(&format!(
        "Imported {} grants ({} chunks)",
        stats.grants, stats.chunks
    ));
    if stats.failed > 0 {
        print_warning(&format!("{} grants failed, see the log for details", stats.failed));
    }
    print_info(&format!("Catalogue now holds {} grants", database.count_grants().await?));
    Ok(())
}

pub fn handle_config(config: &AppConfig) {
    print_config(config);
}
