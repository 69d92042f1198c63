//! Retrieval seams: the vector retriever, the grant repository, and the
//! timeout-guarded wrapper the pipeline talks to

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use crate::errors::GrantScoutError;
use crate::errors::Result;
use crate::models::GrantRecord;
use crate::models::SearchHit;

/// Semantic search over grant document fragments
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Return up to `top_k` scored hits for `query`, best first
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;
}

/// Read access to the relational grant store
#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Records for the given ids; unknown ids are simply absent from the result
    async fn get_grants_by_ids(&self, ids: &[String]) -> Result<Vec<GrantRecord>>;

    /// List grants, optionally narrowed by a free-text filter over title and description
    async fn list_grants(
        &self,
        filter: Option<&str>,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<GrantRecord>>;

    /// Grants whose title contains `fragment` (case-insensitive)
    async fn find_by_title(&self, fragment: &str, limit: usize) -> Result<Vec<GrantRecord>>;
}

/// Await `call`, turning an elapsed `timeout` into [`GrantScoutError::Timeout`]
async fn bounded<T>(
    service: &str,
    timeout: Duration,
    call: impl Future<Output = Result<T>> + Send,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GrantScoutError::Timeout {
            service: service.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

/// Repository whose every call is cut off after `timeout`
struct BoundedRepository {
    inner: Arc<dyn GrantRepository>,
    timeout: Duration,
}

const REPOSITORY_SERVICE: &str = "grant repository";

#[async_trait]
impl GrantRepository for BoundedRepository {
    async fn get_grants_by_ids(&self, ids: &[String]) -> Result<Vec<GrantRecord>> {
        bounded(
            REPOSITORY_SERVICE,
            self.timeout,
            self.inner.get_grants_by_ids(ids),
        )
        .await
    }

    async fn list_grants(
        &self,
        filter: Option<&str>,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<GrantRecord>> {
        bounded(
            REPOSITORY_SERVICE,
            self.timeout,
            self.inner.list_grants(filter, active_only, limit),
        )
        .await
    }

    async fn find_by_title(&self, fragment: &str, limit: usize) -> Result<Vec<GrantRecord>> {
        bounded(
            REPOSITORY_SERVICE,
            self.timeout,
            self.inner.find_by_title(fragment, limit),
        )
        .await
    }
}

/// Timeout-bounded access to the vector retriever and repository
#[derive(Clone)]
pub struct Retriever {
    vector: Arc<dyn VectorRetriever>,
    repository: Arc<dyn GrantRepository>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        vector: Arc<dyn VectorRetriever>,
        repository: Arc<dyn GrantRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            vector,
            repository: Arc::new(BoundedRepository {
                inner: repository,
                timeout,
            }),
            timeout,
        }
    }

    /// The repository, with the same timeout as semantic search
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn GrantRepository> {
        &self.repository
    }

    /// Semantic search with a bounded wait
    pub async fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        debug!("Performing semantic search (limit {}): {}", limit, query);

        bounded(
            "vector retriever",
            self.timeout,
            self.vector.search(query, limit),
        )
        .await
    }

    /// Degraded path when semantic search is unavailable: recent grants,
    /// scored by rank so downstream thresholds still order them
    pub async fn recent_grants(&self, limit: usize, active_only: bool) -> Result<Vec<SearchHit>> {
        warn!("Falling back to recent grants listing instead of semantic search");

        let grants = self.repository.list_grants(None, active_only, limit).await?;
        let total = grants.len().max(1) as f32;

        Ok(grants
            .into_iter()
            .enumerate()
            .map(|(idx, grant)| SearchHit {
                grant_id: Some(grant.id),
                score: 1.0 - (idx as f32 / total) * 0.5,
                text: String::new(),
                doc_type: "listing".to_string(),
            })
            .collect())
    }

    /// Semantic search, degrading to the recent listing on upstream failure
    pub async fn search_or_recent(
        &self,
        query: &str,
        limit: usize,
        active_only: bool,
    ) -> Result<Vec<SearchHit>> {
        match self.semantic_search(query, limit).await {
            Ok(hits) => Ok(hits),
            Err(e) if e.is_upstream() => {
                warn!("Semantic search failed: {}", e);
                self.recent_grants(limit, active_only).await
            }
            Err(e) => Err(e),
        }
    }
}
