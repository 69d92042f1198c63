use super::Database;
use crate::GrantScoutError;
use crate::Result;

impl Database {
    /// Check if database schema is initialized
    /// Returns true if all required tables exist
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        for table_name in ["grants", "grant_chunks"] {
            let result = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = $1
                )
                ",
            )
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

            if !result {
                tracing::debug!("Missing required table: {}", table_name);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Verify database schema or return helpful error
    pub async fn verify_schema_or_error(&self) -> Result<()> {
        if !self.is_schema_initialized().await? {
            return Err(GrantScoutError::Custom(
                "Database schema not initialized!\n\n\
                 Please run the following command to initialize the database:\n\n\
                 \x1b[1;32mgrantscout init\x1b[0m"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create tables and indexes; `dimension` sizes the embedding column
    pub async fn init_schema(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS grants (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                description TEXT,
                funding_amount DOUBLE PRECISION,
                deadline TIMESTAMP WITH TIME ZONE,
                opens_at TIMESTAMP WITH TIME ZONE,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                tags TEXT[],
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Column type depends on configuration, so it cannot be a bound parameter
        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS grant_chunks (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                grant_id TEXT REFERENCES grants(id) ON DELETE CASCADE,
                doc_type TEXT,
                text TEXT NOT NULL,
                embedding VECTOR({dimension}) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "
        ))
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_grants_source ON grants(source)",
            "CREATE INDEX IF NOT EXISTS idx_grants_active ON grants(is_active)",
            "CREATE INDEX IF NOT EXISTS idx_grants_updated ON grants(updated_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_grant_chunks_grant ON grant_chunks(grant_id)",
            "CREATE INDEX IF NOT EXISTS idx_grant_chunks_embedding ON grant_chunks \
             USING hnsw (embedding vector_cosine_ops)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database schema initialized (embedding dimension {})", dimension);
        Ok(())
    }
}
