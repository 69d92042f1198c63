use pgvector::Vector;

use super::Database;
use crate::models::SearchHit;
use crate::Result;

/// One embedded fragment of a grant document
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    pub grant_id: String,
    pub doc_type: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl Database {
    /// Nearest chunks by cosine similarity, best first
    pub async fn search_chunks(&self, query_embedding: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>> {
        #[derive(sqlx::FromRow)]
        struct RawHit {
            grant_id: Option<String>,
            doc_type: Option<String>,
            text: String,
            similarity: f64,
        }

        let raw = sqlx::query_as::<_, RawHit>(
            r"
            SELECT
                gc.grant_id,
                gc.doc_type,
                gc.text,
                1 - (gc.embedding <=> $1) as similarity
            FROM grant_chunks gc
            ORDER BY gc.embedding <=> $1
            LIMIT $2
            ",
        )
        .bind(Vector::from(query_embedding))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(raw
            .into_iter()
            .map(|r| SearchHit {
                grant_id: r.grant_id,
                score: (r.similarity as f32).clamp(0.0, 1.0),
                text: r.text,
                doc_type: r.doc_type.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn insert_chunk(&self, chunk: ChunkInsert) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO grant_chunks (grant_id, doc_type, text, embedding)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&chunk.grant_id)
        .bind(&chunk.doc_type)
        .bind(&chunk.text)
        .bind(Vector::from(chunk.embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_chunks_for_grant(&self, grant_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM grant_chunks WHERE grant_id = $1")
            .bind(grant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
