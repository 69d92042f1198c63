//! Profile-driven eligibility: hard pass/fail rules and a continuous fit score
//!
//! Sector overlap only ever raises the fit score. It never excludes a grant,
//! since multi-sector programmes rarely name every sector they accept.

use tracing::debug;

use crate::models::Candidate;
use crate::models::GrantRecord;
use crate::models::OrganizationType;
use crate::models::Profile;
use crate::models::ProjectStage;

/// Fit score used when no profile information exists
pub const NEUTRAL_FIT: f32 = 0.5;

/// Funding ceiling leniency over the declared maximum
pub const FUNDING_LENIENCY: f64 = 2.0;

const SECTOR_BONUS: f32 = 0.3;
const ORGANIZATION_BONUS: f32 = 0.2;
const FUNDING_IN_RANGE_BONUS: f32 = 0.2;
const FUNDING_NEAR_RANGE_BONUS: f32 = 0.1;
const PARTNERSHIP_BONUS: f32 = 0.1;

/// Phrases in grant text that exclude an organization type
fn exclusion_phrases(org: OrganizationType) -> &'static [&'static str] {
    match org {
        OrganizationType::Sme => &["large companies only", "corporate only"],
        OrganizationType::University => &["industry only", "commercial only"],
        OrganizationType::Charity => &["for-profit only", "companies only"],
        OrganizationType::LargeCompany => &["sme only", "smes only"],
        OrganizationType::PublicHealthService => &[],
    }
}

/// Stateless eligibility rules over a grant record and a user profile
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityEngine;

impl EligibilityEngine {
    /// Hard filter. An empty profile never excludes anything.
    #[must_use]
    pub fn passes(&self, record: &GrantRecord, profile: &Profile) -> bool {
        if profile.is_empty() {
            return true;
        }
        let text = record.eligibility_text();

        if let Some(org) = profile.organization_type {
            if let Some(phrase) = exclusion_phrases(org)
                .iter()
                .find(|phrase| text.contains(*phrase))
            {
                debug!("Grant {} excluded for {}: '{}'", record.id, org.label(), phrase);
                return false;
            }
        }

        if let (Some(range), Some(amount)) = (profile.funding_range, record.funding_amount) {
            if let Some(max) = range.max {
                if amount > max * FUNDING_LENIENCY {
                    debug!(
                        "Grant {} excluded: £{:.0} exceeds {}x declared max £{:.0}",
                        record.id, amount, FUNDING_LENIENCY, max
                    );
                    return false;
                }
            }
        }

        if profile.project_stage == Some(ProjectStage::Early) {
            let needs_market = text.contains("commercial readiness") || text.contains("market launch");
            let welcomes_early = text.contains("early stage") || text.contains("proof of concept");
            if needs_market && !welcomes_early {
                debug!("Grant {} excluded: requires commercial readiness", record.id);
                return false;
            }
        }

        true
    }

    /// Continuous profile alignment in [0, 1]
    #[must_use]
    pub fn fit_score(&self, record: &GrantRecord, profile: &Profile) -> f32 {
        if profile.is_empty() {
            return NEUTRAL_FIT;
        }
        let text = record.eligibility_text();
        let mut score = NEUTRAL_FIT;

        if profile
            .sector
            .iter()
            .any(|sector| text.contains(&sector.to_lowercase()))
        {
            score += SECTOR_BONUS;
        }

        if let Some(org) = profile.organization_type {
            if org.text_markers().iter().any(|marker| text.contains(marker)) {
                score += ORGANIZATION_BONUS;
            }
        }

        if let (Some(range), Some(amount)) = (profile.funding_range, record.funding_amount) {
            if range.contains(amount) {
                score += FUNDING_IN_RANGE_BONUS;
            } else if range.max.map_or(true, |max| amount < max * FUNDING_LENIENCY) {
                score += FUNDING_NEAR_RANGE_BONUS;
            }
        }

        if profile.has_partnerships == Some(true) && text.contains("partnership") {
            score += PARTNERSHIP_BONUS;
        }

        score.clamp(0.0, 1.0)
    }

    /// Drop ineligible candidates and set fit scores on the rest
    pub fn apply(&self, candidates: Vec<Candidate>, profile: &Profile) -> Vec<Candidate> {
        let before = candidates.len();
        let kept: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| self.passes(&candidate.record, profile))
            .map(|mut candidate| {
                candidate.fit_score = self.fit_score(&candidate.record, profile);
                candidate
            })
            .collect();
        debug!("Eligibility kept {} of {} candidates", kept.len(), before);
        kept
    }
}
