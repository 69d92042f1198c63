//! Loads grant records into the store and embeds their text as chunks

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use super::text::chunk_text;
use super::EmbeddingClient;
use crate::database::ChunkInsert;
use crate::database::Database;
use crate::errors::Result;
use crate::models::GrantRecord;

/// Maximum bytes per description chunk
pub const CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub grants: usize,
    pub chunks: usize,
    pub failed: usize,
}

/// Texts embedded for one grant, tagged with their document type
pub fn grant_documents(grant: &GrantRecord, chunk_size: usize) -> Vec<(&'static str, String)> {
    let mut overview = format!("{} ({})", grant.title, grant.source);
    if !grant.tags.is_empty() {
        overview.push_str(&format!(". Topics: {}", grant.tags.join(", ")));
    }

    let mut documents = vec![("overview", overview)];
    documents.extend(
        chunk_text(&grant.description, chunk_size)
            .into_iter()
            .map(|chunk| ("description", chunk)),
    );
    documents
}

pub struct GrantIndexer {
    database: Arc<Database>,
    client: Arc<EmbeddingClient>,
}

impl GrantIndexer {
    pub fn new(database: Arc<Database>, client: Arc<EmbeddingClient>) -> Self {
        Self { database, client }
    }

    /// Import a JSON array of grant records
    pub async fn index_file<P: AsRef<Path>>(&self, path: P) -> Result<IndexStats> {
        let content = tokio::fs::read_to_string(path).await?;
        let grants: Vec<GrantRecord> = serde_json::from_str(&content)?;
        info!("Indexing {} grants", grants.len());

        let mut stats = IndexStats::default();
        for grant in &grants {
            match self.index_grant(grant).await {
                Ok(chunks) => {
                    stats.grants += 1;
                    stats.chunks += chunks;
                }
                Err(e) => {
                    warn!("Failed to index grant {}: {}", grant.id, e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "Indexed {} grants ({} chunks, {} failed)",
            stats.grants, stats.chunks, stats.failed
        );
        Ok(stats)
    }

    /// Replace one grant and its chunks; returns the chunk count
    pub async fn index_grant(&self, grant: &GrantRecord) -> Result<usize> {
        let documents = grant_documents(grant, CHUNK_SIZE);
        let embeddings = self
            .client
            .generate_batch(documents.iter().map(|(_, text)| text.as_str()).collect())
            .await?;

        self.database.upsert_grant(grant).await?;
        self.database.delete_chunks_for_grant(&grant.id).await?;
        let count = documents.len();
        for ((doc_type, text), embedding) in documents.into_iter().zip(embeddings) {
            self.database
                .insert_chunk(ChunkInsert {
                    grant_id: grant.id.clone(),
                    doc_type: doc_type.to_string(),
                    text,
                    embedding,
                })
                .await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_documents() {
        let grant = GrantRecord {
            id: "innovate_uk_7".to_string(),
            source: "innovate_uk".to_string(),
            title: "Smart Grants".to_string(),
            url: String::new(),
            description: "Game-changing ideas.\n\nOpen to UK SMEs.".to_string(),
            funding_amount: Some(500_000.0),
            deadline: None,
            opens_at: None,
            is_active: true,
            tags: vec!["innovation".to_string()],
        };
        let documents = grant_documents(&grant, CHUNK_SIZE);
        assert_eq!(
            documents[0],
            ("overview", "Smart Grants (innovate_uk). Topics: innovation".to_string())
        );
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[2].1, "Open to UK SMEs.");
    }
}
