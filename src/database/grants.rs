use chrono::DateTime;
use chrono::Utc;

use super::Database;
use crate::models::GrantRecord;
use crate::Result;

/// Row shape of the `grants` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GrantRow {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub funding_amount: Option<f64>,
    pub deadline: Option<DateTime<Utc>>,
    pub opens_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub tags: Option<Vec<String>>,
}

impl From<GrantRow> for GrantRecord {
    fn from(row: GrantRow) -> Self {
        Self {
            id: row.id,
            source: row.source,
            title: row.title,
            url: row.url.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            funding_amount: row.funding_amount,
            deadline: row.deadline,
            opens_at: row.opens_at,
            is_active: row.is_active,
            tags: row.tags.unwrap_or_default(),
        }
    }
}

const GRANT_COLUMNS: &str =
    "id, source, title, url, description, funding_amount, deadline, opens_at, is_active, tags";

impl Database {
    /// Fetch grants by id; ids with no row are left out
    pub async fn get_grants_by_ids(&self, ids: &[String]) -> Result<Vec<GrantRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            "SELECT {GRANT_COLUMNS} FROM grants WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() < ids.len() {
            tracing::debug!(
                "Resolved {} of {} requested grant ids",
                rows.len(),
                ids.len()
            );
        }
        Ok(rows.into_iter().map(GrantRecord::from).collect())
    }

    /// Most recently updated grants, optionally narrowed by a text filter
    pub async fn list_grants(
        &self,
        filter: Option<&str>,
        active_only: bool,
        limit: usize,
    ) -> Result<Vec<GrantRecord>> {
        let pattern = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| format!("%{f}%"));

        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            r"
            SELECT {GRANT_COLUMNS}
            FROM grants
            WHERE ($1::text IS NULL OR title ILIKE $1 OR description ILIKE $1)
            AND (NOT $2 OR is_active)
            ORDER BY updated_at DESC NULLS LAST, id
            LIMIT $3
            "
        ))
        .bind(pattern)
        .bind(active_only)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GrantRecord::from).collect())
    }

    /// Grants whose title contains `fragment`, case-insensitive
    pub async fn find_grants_by_title(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<GrantRecord>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            r"
            SELECT {GRANT_COLUMNS}
            FROM grants
            WHERE title ILIKE $1
            ORDER BY is_active DESC, length(title), id
            LIMIT $2
            "
        ))
        .bind(format!("%{fragment}%"))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GrantRecord::from).collect())
    }

    /// Insert or replace a grant
    pub async fn upsert_grant(&self, grant: &GrantRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO grants
                (id, source, title, url, description, funding_amount, deadline, opens_at, is_active, tags, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE SET
                source = EXCLUDED.source,
                title = EXCLUDED.title,
                url = EXCLUDED.url,
                description = EXCLUDED.description,
                funding_amount = EXCLUDED.funding_amount,
                deadline = EXCLUDED.deadline,
                opens_at = EXCLUDED.opens_at,
                is_active = EXCLUDED.is_active,
                tags = EXCLUDED.tags,
                updated_at = NOW()
            ",
        )
        .bind(&grant.id)
        .bind(&grant.source)
        .bind(&grant.title)
        .bind(&grant.url)
        .bind(&grant.description)
        .bind(grant.funding_amount)
        .bind(grant.deadline)
        .bind(grant.opens_at)
        .bind(grant.is_active)
        .bind(&grant.tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_grants(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM grants")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
