use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Who wrote a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One immutable conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grants_mentioned: Vec<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            grants_mentioned: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_grants(mut self, grants: Vec<String>) -> Self {
        self.grants_mentioned = grants;
        self
    }
}

/// Query intent driving candidate sourcing and card counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Comparative,
    Followup,
    Discovery,
    Eligibility,
    Strategic,
    Clarification,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Self::Comparative,
        Self::Followup,
        Self::Discovery,
        Self::Eligibility,
        Self::Strategic,
        Self::Clarification,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comparative => "comparative",
            Self::Followup => "followup",
            Self::Discovery => "discovery",
            Self::Eligibility => "eligibility",
            Self::Strategic => "strategic",
            Self::Clarification => "clarification",
        }
    }

    /// Short description handed to the classifier prompt
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Comparative => "Comparing specific grants already discussed",
            Self::Followup => "Following up on previous topic",
            Self::Discovery => "Finding new grants",
            Self::Eligibility => "Checking eligibility for grants",
            Self::Strategic => "Asking for strategic advice",
            Self::Clarification => "Asking for details about a grant",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_', ' '], "");
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| format!("unknown intent: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationType {
    #[serde(rename = "SME", alias = "sme")]
    Sme,
    #[serde(rename = "university")]
    University,
    #[serde(rename = "charity")]
    Charity,
    #[serde(rename = "NHS", alias = "nhs", alias = "public-health-service")]
    PublicHealthService,
    #[serde(rename = "large_company")]
    LargeCompany,
}

impl OrganizationType {
    /// Lowercase phrases that count as the organization type being named in grant text
    #[must_use]
    pub const fn text_markers(self) -> &'static [&'static str] {
        match self {
            Self::Sme => &["sme"],
            Self::University => &["university"],
            Self::Charity => &["charity"],
            Self::PublicHealthService => &["nhs"],
            Self::LargeCompany => &["large_company", "large company"],
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sme => "SME",
            Self::University => "university",
            Self::Charity => "charity",
            Self::PublicHealthService => "NHS",
            Self::LargeCompany => "large company",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStage {
    Early,
    Development,
    Commercialization,
}

/// Declared funding capacity in GBP
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FundingRange {
    #[must_use]
    pub fn contains(&self, amount: f64) -> bool {
        amount >= self.min && self.max.map_or(true, |max| amount <= max)
    }
}

/// Accumulated facts about the user, merged over turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<OrganizationType>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sector: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_partnerships: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_patented_tech: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_size: Option<TeamSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_range: Option<FundingRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_stage: Option<ProjectStage>,
}

impl Profile {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.organization_type.is_none()
            && self.sector.is_empty()
            && self.has_partnerships.is_none()
            && self.has_patented_tech.is_none()
            && self.team_size.is_none()
            && self.funding_range.is_none()
            && self.project_stage.is_none()
    }

    /// Newest non-null scalar wins; sectors are unioned
    pub fn merge(&mut self, update: Profile) {
        if update.organization_type.is_some() {
            self.organization_type = update.organization_type;
        }
        self.sector.extend(
            update
                .sector
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        );
        if update.has_partnerships.is_some() {
            self.has_partnerships = update.has_partnerships;
        }
        if update.has_patented_tech.is_some() {
            self.has_patented_tech = update.has_patented_tech;
        }
        if update.team_size.is_some() {
            self.team_size = update.team_size;
        }
        if update.funding_range.is_some() {
            self.funding_range = update.funding_range;
        }
        if update.project_stage.is_some() {
            self.project_stage = update.project_stage;
        }
    }
}

/// Grant as stored in the relational repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// Funding amount in GBP
    #[serde(default)]
    pub funding_amount: Option<f64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub opens_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl GrantRecord {
    /// Active, and if a deadline exists it lies strictly after `now`
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.deadline.map_or(true, |deadline| deadline > now)
    }

    /// Lowercased description and tags, the text eligibility rules look at
    #[must_use]
    pub fn eligibility_text(&self) -> String {
        let mut text = self.description.to_lowercase();
        for tag in &self.tags {
            text.push(' ');
            text.push_str(&tag.to_lowercase());
        }
        text
    }
}

/// Scored fragment returned by the vector retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub grant_id: Option<String>,
    pub score: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub doc_type: String,
}

impl SearchHit {
    pub fn new(grant_id: impl Into<String>, score: f32) -> Self {
        Self {
            grant_id: Some(grant_id.into()),
            score,
            text: String::new(),
            doc_type: String::new(),
        }
    }
}

/// How a shortlisted candidate cleared the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrength {
    Strong,
    Stretch,
}

/// One grant's scored representation within a single ranking pass
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: GrantRecord,
    pub base_score: f32,
    pub adjusted_score: f32,
    pub fit_score: f32,
    pub combined_score: f32,
    pub strength: Option<MatchStrength>,
}

impl Candidate {
    #[must_use]
    pub fn new(record: GrantRecord, base_score: f32) -> Self {
        Self {
            record,
            base_score,
            adjusted_score: base_score,
            fit_score: crate::rag::eligibility::NEUTRAL_FIT,
            combined_score: base_score.clamp(0.0, 1.0),
            strength: None,
        }
    }

    #[must_use]
    pub fn grant_id(&self) -> &str {
        &self.record.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.record.title
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.record.source
    }
}

/// Grant card handed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantReference {
    pub grant_id: String,
    pub title: String,
    pub source: String,
    pub url: String,
    pub total_fund_gbp: Option<f64>,
    pub closes_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub score: f32,
    #[serde(default)]
    pub stretch_fit: bool,
}

impl From<&Candidate> for GrantReference {
    fn from(candidate: &Candidate) -> Self {
        Self {
            grant_id: candidate.record.id.clone(),
            title: candidate.record.title.clone(),
            source: candidate.record.source.clone(),
            url: candidate.record.url.clone(),
            total_fund_gbp: candidate.record.funding_amount,
            closes_at: candidate.record.deadline,
            is_active: candidate.record.is_active,
            score: (candidate.combined_score * 1000.0).round() / 1000.0,
            stretch_fit: candidate.strength == Some(MatchStrength::Stretch),
        }
    }
}
