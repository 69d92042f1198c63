//! Threshold tiering, adaptive relaxation and greedy diversity selection

use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::errors::GrantScoutError;
use crate::errors::Result;
use crate::models::Candidate;
use crate::models::MatchStrength;

/// Penalty multiplier for a candidate sharing a source with a pick
const SAME_SOURCE_PENALTY: f32 = 0.5;
/// Penalty multiplier for a candidate whose title mostly repeats a pick's
const TITLE_OVERLAP_PENALTY: f32 = 0.3;
const TITLE_OVERLAP_LIMIT: f32 = 0.5;

/// Strong/weak score thresholds plus an optional relaxation chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub strong: f32,
    pub weak: f32,
    /// Progressively lower weak thresholds tried while too few open grants survive
    #[serde(default)]
    pub fallback_chain: Vec<f32>,
    #[serde(default)]
    pub min_open: usize,
}

impl ThresholdPolicy {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            strong: 0.65,
            weak: 0.45,
            fallback_chain: Vec::new(),
            min_open: 0,
        }
    }

    #[must_use]
    pub fn discovery() -> Self {
        Self {
            strong: 0.55,
            weak: 0.48,
            fallback_chain: Vec::new(),
            min_open: 0,
        }
    }

    #[must_use]
    pub fn adaptive() -> Self {
        Self {
            strong: 0.50,
            weak: 0.50,
            fallback_chain: vec![0.35],
            min_open: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        if !in_range(self.strong) || !in_range(self.weak) {
            return Err(GrantScoutError::Config(format!(
                "thresholds must be within [0, 1], got strong={} weak={}",
                self.strong, self.weak
            )));
        }
        if self.weak > self.strong {
            return Err(GrantScoutError::Config(format!(
                "weak threshold {} exceeds strong threshold {}",
                self.weak, self.strong
            )));
        }
        let mut previous = self.weak;
        for &threshold in &self.fallback_chain {
            if !in_range(threshold) || threshold >= previous {
                return Err(GrantScoutError::Config(format!(
                    "fallback thresholds must decrease below {previous}, got {threshold}"
                )));
            }
            previous = threshold;
        }
        Ok(())
    }

    /// Weak thresholds in the order they are tried
    fn weak_thresholds(&self) -> impl Iterator<Item = f32> + '_ {
        std::iter::once(self.weak).chain(self.fallback_chain.iter().copied())
    }
}

/// Outcome of a ranking pass. An empty shortlist is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Shortlist(Vec<Candidate>),
    NoMatch,
}

impl Selection {
    fn from_picks(picks: Vec<Candidate>) -> Self {
        if picks.is_empty() {
            Self::NoMatch
        } else {
            Self::Shortlist(picks)
        }
    }

    #[must_use]
    pub const fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch)
    }

    #[must_use]
    pub fn into_candidates(self) -> Vec<Candidate> {
        match self {
            Self::Shortlist(picks) => picks,
            Self::NoMatch => Vec::new(),
        }
    }
}

/// Blend adjusted relevance with eligibility fit. Without a profile the
/// adjusted score stands alone.
pub fn combine_scores(candidates: &mut [Candidate], has_profile: bool, profile_weight: f32) {
    for candidate in candidates.iter_mut() {
        let combined = if has_profile {
            (1.0 - profile_weight) * candidate.adjusted_score + profile_weight * candidate.fit_score
        } else {
            candidate.adjusted_score
        };
        candidate.combined_score = combined.clamp(0.0, 1.0);
    }
}

fn title_words(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Share of the candidate's own title words that also appear in `other`
fn title_overlap(candidate: &HashSet<String>, other: &HashSet<String>) -> f32 {
    if candidate.is_empty() {
        return 0.0;
    }
    candidate.intersection(other).count() as f32 / candidate.len() as f32
}

/// Greedy max-marginal-relevance pick over a pre-sorted pool.
///
/// Keeps a running penalty per remaining index; after every pick the penalty
/// of each remaining candidate grows by its similarity to that pick. Ties go
/// to the earlier index, so the output is fully determined by input order.
pub fn diversify(pool: Vec<Candidate>, limit: usize, diversity_weight: f32) -> Vec<Candidate> {
    if limit == 0 || pool.is_empty() {
        return Vec::new();
    }

    let words: Vec<HashSet<String>> = pool.iter().map(|c| title_words(c.title())).collect();
    let mut penalties = vec![0.0_f32; pool.len()];
    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    let mut order: Vec<usize> = Vec::with_capacity(limit.min(pool.len()));

    while order.len() < limit && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_value = f32::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let value = pool[idx].combined_score - penalties[idx];
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }

        let picked = remaining.remove(best_pos);
        order.push(picked);

        for &idx in &remaining {
            if pool[idx].source() == pool[picked].source() {
                penalties[idx] += SAME_SOURCE_PENALTY * diversity_weight;
            }
            if title_overlap(&words[idx], &words[picked]) > TITLE_OVERLAP_LIMIT {
                penalties[idx] += TITLE_OVERLAP_PENALTY * diversity_weight;
            }
        }
    }

    let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

/// Tiers candidates into open and closed pools and picks a diverse shortlist
#[derive(Debug, Clone)]
pub struct TieringSelector {
    max_shortlist: usize,
    diversity_weight: f32,
}

impl TieringSelector {
    #[must_use]
    pub fn new(max_shortlist: usize, diversity_weight: f32) -> Self {
        Self {
            max_shortlist,
            diversity_weight,
        }
    }

    #[must_use]
    pub const fn max_shortlist(&self) -> usize {
        self.max_shortlist
    }

    /// Survivors of `threshold`, split into (open, closed), each sorted by
    /// combined score descending with stable ties
    fn tier(
        candidates: &[Candidate],
        threshold: f32,
        now: DateTime<Utc>,
    ) -> (Vec<Candidate>, Vec<Candidate>) {
        let (mut open, mut closed): (Vec<Candidate>, Vec<Candidate>) = candidates
            .iter()
            .filter(|c| c.combined_score >= threshold)
            .cloned()
            .partition(|c| c.record.is_open_at(now));
        open.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        closed.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        (open, closed)
    }

    /// Run the full tiering pass under `policy`
    pub fn select(
        &self,
        candidates: &[Candidate],
        policy: &ThresholdPolicy,
        now: DateTime<Utc>,
    ) -> Selection {
        let mut tiers = (Vec::new(), Vec::new());
        for threshold in policy.weak_thresholds() {
            tiers = Self::tier(candidates, threshold, now);
            if tiers.0.len() >= policy.min_open {
                break;
            }
            debug!(
                "Only {} open grants at threshold {:.2}, relaxing",
                tiers.0.len(),
                threshold
            );
        }
        let (open, closed) = tiers;

        let mut picks = diversify(open, self.max_shortlist, self.diversity_weight);
        let room = self.max_shortlist.saturating_sub(picks.len());
        picks.extend(diversify(closed, room, self.diversity_weight));

        for pick in &mut picks {
            pick.strength = Some(if pick.combined_score >= policy.strong {
                MatchStrength::Strong
            } else {
                MatchStrength::Stretch
            });
        }

        info!(
            "Selected {} of {} candidates (strong {:.2}, weak {:.2})",
            picks.len(),
            candidates.len(),
            policy.strong,
            policy.weak
        );
        Selection::from_picks(picks)
    }
}
