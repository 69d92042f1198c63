//! Hit aggregation: many scored fragments in, one candidate per grant out

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::models::Candidate;
use crate::models::GrantRecord;
use crate::models::SearchHit;
use crate::rag::retriever::GrantRepository;

/// Best score seen for one grant id within an aggregation pass
#[derive(Debug, Clone, PartialEq)]
pub struct HitGroup {
    pub grant_id: String,
    pub best_score: f32,
    pub hit_count: usize,
}

/// Group hits by grant id in first-seen order, keeping the maximum score.
/// Hits without a grant id are discarded.
pub fn group_hits(hits: &[SearchHit]) -> Vec<HitGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<HitGroup> = Vec::new();

    for hit in hits {
        let Some(grant_id) = hit.grant_id.as_deref() else {
            continue;
        };
        if let Some(&pos) = index.get(grant_id) {
            let group = &mut groups[pos];
            group.best_score = group.best_score.max(hit.score);
            group.hit_count += 1;
        } else {
            index.insert(grant_id, groups.len());
            groups.push(HitGroup {
                grant_id: grant_id.to_string(),
                best_score: hit.score,
                hit_count: 1,
            });
        }
    }

    groups
}

/// Attach repository records to groups; groups with no record are dropped
pub fn attach_records(groups: Vec<HitGroup>, records: Vec<GrantRecord>) -> Vec<Candidate> {
    let mut by_id: HashMap<String, GrantRecord> = records
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();

    groups
        .into_iter()
        .filter_map(|group| match by_id.remove(&group.grant_id) {
            Some(record) => Some(Candidate::new(record, group.best_score)),
            None => {
                debug!("Dropping unresolvable grant id {}", group.grant_id);
                None
            }
        })
        .collect()
}

/// Request-level record filters
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub active_only: bool,
    pub sources: Option<Vec<String>>,
}

impl RecordFilter {
    #[must_use]
    pub fn allows(&self, record: &GrantRecord) -> bool {
        if self.active_only && !record.is_active {
            return false;
        }
        match &self.sources {
            Some(sources) if !sources.is_empty() => sources
                .iter()
                .any(|source| source.eq_ignore_ascii_case(&record.source)),
            _ => true,
        }
    }
}

/// Turns raw retrieval hits into candidates enriched with repository data
#[derive(Clone)]
pub struct CandidateAggregator {
    repository: Arc<dyn GrantRepository>,
}

impl CandidateAggregator {
    pub fn new(repository: Arc<dyn GrantRepository>) -> Self {
        Self { repository }
    }

    /// Aggregate hits into candidates, applying the record filter
    pub async fn aggregate(
        &self,
        hits: &[SearchHit],
        filter: &RecordFilter,
    ) -> Result<Vec<Candidate>> {
        let groups = group_hits(hits);
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = groups.iter().map(|g| g.grant_id.clone()).collect();
        let records = self.repository.get_grants_by_ids(&ids).await?;
        let candidates: Vec<Candidate> = attach_records(groups, records)
            .into_iter()
            .filter(|candidate| filter.allows(&candidate.record))
            .collect();

        debug!(
            "Aggregated {} hits into {} candidates",
            hits.len(),
            candidates.len()
        );
        Ok(candidates)
    }

    /// Candidates for grant ids carried over from earlier turns, in the given order
    pub async fn carryover(
        &self,
        ids: &[String],
        score: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<Candidate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let groups = ids
            .iter()
            .map(|id| HitGroup {
                grant_id: id.clone(),
                best_score: score,
                hit_count: 0,
            })
            .collect();
        let records = self.repository.get_grants_by_ids(ids).await?;
        Ok(attach_records(groups, records)
            .into_iter()
            .filter(|candidate| filter.allows(&candidate.record))
            .collect())
    }
}
