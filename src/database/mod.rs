use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::GrantRecord;
use crate::models::SearchHit;
use crate::rag::retriever::GrantRepository;
use crate::rag::retriever::VectorRetriever;
use crate::embeddings::EmbeddingClient;
use crate::Result;

mod chunks;
mod grants;
mod schema;

pub use chunks::ChunkInsert;
pub use grants::GrantRow;

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database instance from configuration
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::info!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

/// `GrantRepository` over the `grants` table
#[derive(Debug, Clone)]
pub struct PgGrantRepository {
    database: Arc<Database>,
}

impl PgGrantRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl GrantRepository for PgGrantRepository {
    async fn get_grants_by_ids(&self, ids: &[String]) -> Result<Vec<GrantRecord>> {
        self.database.get_grants_by_ids(ids).await
    }

    async fn list_grants(
        &self,
        filter: Option<&str>,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<GrantRecord>> {
        self.database.list_grants(filter, active_only, limit).await
    }

    async fn find_by_title(&self, fragment: &str, limit: usize) -> Result<Vec<GrantRecord>> {
        self.database.find_grants_by_title(fragment, limit).await
    }
}

/// `VectorRetriever` over pgvector chunk embeddings
pub struct PgVectorRetriever {
    database: Arc<Database>,
    embeddings: Arc<EmbeddingClient>,
}

impl PgVectorRetriever {
    pub fn new(database: Arc<Database>, embeddings: Arc<EmbeddingClient>) -> Self {
        Self {
            database,
            embeddings,
        }
    }
}

#[async_trait]
impl VectorRetriever for PgVectorRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let embedding = self.embeddings.generate(query).await?;
        self.database.search_chunks(embedding, top_k).await
    }
}
