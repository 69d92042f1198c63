//! Context assembly: shortlist, profile and conversation rendered as prompt text

use crate::models::Candidate;
use crate::models::Message;
use crate::models::Profile;

/// Truncate to at most `max_chars` characters, appending "..." when cut
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

pub fn format_gbp(amount: f64) -> String {
    let whole = amount.round().abs() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("£{grouped}")
}

/// Assembler for creating prompt context from ranked grants
pub struct ContextAssembler {
    max_context_length: usize,
    history_messages: usize,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(max_context_length: usize, history_messages: usize) -> Self {
        Self {
            max_context_length,
            history_messages,
        }
    }

    /// Numbered grant entries, stopping before the length budget is exceeded
    #[must_use]
    pub fn assemble_grants(&self, grants: &[Candidate]) -> String {
        if grants.is_empty() {
            return "No grants provided".to_string();
        }

        let mut context = String::new();
        for (idx, grant) in grants.iter().enumerate() {
            let entry = format!("\n{}. {}\n", idx + 1, self.format_grant(grant));
            if context.len() + entry.len() > self.max_context_length {
                break;
            }
            context.push_str(&entry);
        }
        context
    }

    fn format_grant(&self, grant: &Candidate) -> String {
        let record = &grant.record;
        let funding = record
            .funding_amount
            .map_or_else(|| "TBC".to_string(), format_gbp);
        let deadline = record
            .deadline
            .map_or_else(|| "TBC".to_string(), |d| d.format("%Y-%m-%d").to_string());
        let mut lines = vec![
            record.title.clone(),
            format!("   Id: {}", record.id),
            format!("   Source: {}", record.source),
            format!("   Funding: {funding}"),
            format!("   Deadline: {deadline}"),
        ];
        if !record.is_active {
            lines.push("   Status: closed".to_string());
        }
        if !record.description.is_empty() {
            lines.push(format!(
                "   Eligibility: {}",
                truncate_str(&record.description, 200)
            ));
        }
        lines.join("\n")
    }

    #[must_use]
    pub fn format_profile(&self, profile: &Profile) -> String {
        let mut parts = Vec::new();

        if let Some(org) = profile.organization_type {
            parts.push(format!("Organization: {}", org.label()));
        }
        if !profile.sector.is_empty() {
            let sectors: Vec<&str> = profile.sector.iter().map(String::as_str).collect();
            parts.push(format!("Sectors: {}", sectors.join(", ")));
        }
        if profile.has_partnerships == Some(true) {
            parts.push("Has university partnerships".to_string());
        }
        if profile.has_patented_tech == Some(true) {
            parts.push("Has patented technology".to_string());
        }
        if let Some(team) = profile.team_size {
            parts.push(format!("Team size: {}", format!("{team:?}").to_lowercase()));
        }
        if let Some(range) = profile.funding_range {
            let max = range.max.map_or_else(|| "no limit".to_string(), format_gbp);
            parts.push(format!("Funding capacity: {} - {}", format_gbp(range.min), max));
        }
        if let Some(stage) = profile.project_stage {
            parts.push(format!("Project stage: {}", format!("{stage:?}").to_lowercase()));
        }

        if parts.is_empty() {
            "No profile information yet".to_string()
        } else {
            parts.join("\n")
        }
    }

    /// Last few messages as `ROLE: content`
    #[must_use]
    pub fn format_conversation(&self, messages: &[Message]) -> String {
        if messages.is_empty() {
            return "No previous conversation".to_string();
        }
        let start = messages.len().saturating_sub(self.history_messages);
        messages[start..]
            .iter()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.role.as_str().to_uppercase(),
                    truncate_str(&m.content, 300)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(6000, 3)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::FundingRange;
    use crate::models::GrantRecord;
    use crate::models::OrganizationType;
    use crate::models::Role;

    fn grant(id: &str, title: &str) -> Candidate {
        Candidate::new(
            GrantRecord {
                id: id.to_string(),
                source: "nihr".to_string(),
                title: title.to_string(),
                url: format!("https://example.org/{id}"),
                description: "Open to NHS trusts and universities".to_string(),
                funding_amount: Some(1_500_000.0),
                deadline: None,
                opens_at: None,
                is_active: true,
                tags: vec![],
            },
            0.8,
        )
    }

    #[test]
    fn test_format_gbp() {
        assert_eq!(format_gbp(1_500_000.0), "£1,500,000");
        assert_eq!(format_gbp(950.0), "£950");
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("a much longer sentence", 10), "a much ...");
    }

    #[test]
    fn test_assemble_grants_respects_budget() {
        let assembler = ContextAssembler::new(200, 3);
        let grants = vec![grant("nihr_1", "i4i Product"), grant("nihr_2", "i4i Connect")];
        let context = assembler.assemble_grants(&grants);
        assert!(context.contains("1. i4i Product"));
        assert!(context.contains("£1,500,000"));
        assert!(!context.contains("i4i Connect"));
    }

    #[test]
    fn test_format_profile() {
        let assembler = ContextAssembler::default();
        assert_eq!(
            assembler.format_profile(&Profile::default()),
            "No profile information yet"
        );

        let profile = Profile {
            organization_type: Some(OrganizationType::Sme),
            sector: BTreeSet::from(["medtech".to_string()]),
            funding_range: Some(FundingRange {
                min: 0.0,
                max: Some(250_000.0),
            }),
            ..Profile::default()
        };
        let text = assembler.format_profile(&profile);
        assert!(text.contains("Organization: SME"));
        assert!(text.contains("Sectors: medtech"));
        assert!(text.contains("£0 - £250,000"));
    }

    #[test]
    fn test_conversation_keeps_last_messages() {
        let assembler = ContextAssembler::new(6000, 2);
        let messages = vec![
            Message::new(Role::User, "first"),
            Message::new(Role::Assistant, "second"),
            Message::new(Role::User, "third"),
        ];
        assert_eq!(
            assembler.format_conversation(&messages),
            "ASSISTANT: second\nUSER: third"
        );
    }
}
