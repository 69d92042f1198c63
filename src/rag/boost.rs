//! Keyword-pair score adjustment

use tracing::debug;

use crate::models::Candidate;

/// One topic of the boost table
#[derive(Debug, Clone)]
pub struct BoostRule {
    pub topic: &'static str,
    pub query_keys: &'static [&'static str],
    pub title_keys: &'static [&'static str],
    pub factor: f32,
}

const RULES: &[BoostRule] = &[
    BoostRule {
        topic: "oncology",
        query_keys: &["cancer", "oncolog"],
        title_keys: &["cancer", "oncolog"],
        factor: 1.12,
    },
    BoostRule {
        topic: "therapeutics",
        query_keys: &["therap"],
        title_keys: &["therap", "treatment"],
        factor: 1.08,
    },
    BoostRule {
        topic: "paediatrics",
        query_keys: &["paediatr", "pediatr"],
        title_keys: &["paediatr", "pediatr", "children", "child"],
        factor: 1.10,
    },
    BoostRule {
        topic: "ai",
        query_keys: &["ai", "artificial intelligence", "llm", "agentic"],
        title_keys: &["ai", "artificial intelligence", "agentic", "llm"],
        factor: 1.10,
    },
    BoostRule {
        topic: "healthcare",
        query_keys: &["health", "healthcare", "clinical", "medical"],
        title_keys: &["health", "clinical", "medical", "care"],
        factor: 1.10,
    },
];

/// Applies the fixed boost table to candidate scores
#[derive(Debug, Clone)]
pub struct ScoreAdjuster {
    rules: Vec<BoostRule>,
}

impl Default for ScoreAdjuster {
    fn default() -> Self {
        Self::new(RULES.to_vec())
    }
}

impl ScoreAdjuster {
    #[must_use]
    pub fn new(rules: Vec<BoostRule>) -> Self {
        Self { rules }
    }

    fn contains_key(&self, text: &str, key: &str) -> bool {
        // "ai" must stand alone, otherwise "paid" and "maintain" match
        if key == "ai" {
            text.split(|c: char| !c.is_alphanumeric()).any(|word| word == key)
        } else {
            text.contains(key)
        }
    }

    fn contains_any(&self, text: &str, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.contains_key(text, key))
    }

    /// Topics whose query and title key sets both match
    pub fn matching_topics(&self, query: &str, title: &str) -> Vec<&'static str> {
        let q = query.to_lowercase();
        let t = title.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| self.contains_any(&q, rule.query_keys))
            .filter(|rule| self.contains_any(&t, rule.title_keys))
            .map(|rule| rule.topic)
            .collect()
    }

    /// Multiply `base_score` by every matching topic's factor
    pub fn boost(&self, query: &str, title: &str, base_score: f32) -> f32 {
        let q = query.to_lowercase();
        let t = title.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| self.contains_any(&q, rule.query_keys))
            .filter(|rule| self.contains_any(&t, rule.title_keys))
            .fold(base_score, |score, rule| score * rule.factor)
    }

    /// Set adjusted scores and stably re-sort candidates by them
    pub fn adjust(&self, query: &str, candidates: &mut [Candidate]) {
        for candidate in candidates.iter_mut() {
            candidate.adjusted_score = self.boost(query, &candidate.record.title, candidate.base_score);
            if candidate.adjusted_score != candidate.base_score {
                debug!(
                    "Boosted {} ({:?}): {:.3} -> {:.3}",
                    candidate.grant_id(),
                    self.matching_topics(query, candidate.title()),
                    candidate.base_score,
                    candidate.adjusted_score
                );
            }
        }
        candidates.sort_by(|a, b| b.adjusted_score.total_cmp(&a.adjusted_score));
    }
}
