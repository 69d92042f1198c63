//! Prompt templates for the language-model roles

use std::collections::HashMap;

/// Template with `{{variable}}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = extract_variables(&template);
        Self {
            template,
            variables,
        }
    }

    /// Fill in the template; unknown placeholders are left as-is
    #[must_use]
    pub fn render(&self, values: &HashMap<&str, String>) -> String {
        let mut result = self.template.clone();
        for var in &self.variables {
            if let Some(value) = values.get(var.as_str()) {
                result = result.replace(&format!("{{{{{var}}}}}"), value);
            }
        }
        result
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

fn extract_variables(template: &str) -> Vec<String> {
    let mut variables = Vec::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == '}' {
                    chars.next();
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        break;
                    }
                } else {
                    var_name.push(ch);
                    chars.next();
                }
            }
            if !var_name.is_empty() && !variables.contains(&var_name) {
                variables.push(var_name);
            }
        }
    }

    variables
}

/// Prompts used by the classifier, the profile extractor and the advisor
pub struct GrantPrompts;

impl GrantPrompts {
    #[must_use]
    pub fn advisor_system() -> &'static str {
        r"You are an expert UK research funding strategist with deep knowledge of NIHR and Innovate UK funding.

Provide strategic, personalised funding advice. Compare the user's actual situation with each grant's requirements, name gaps and how to close them, and be direct about fit.

Always build on what was just discussed. When asked to compare grants, compare those specific grants. Never recommend grants from unrelated sectors, and never just list grants without analysis. End with one strategic question that moves the user forward."
    }

    #[must_use]
    pub fn intent_classification() -> PromptTemplate {
        PromptTemplate::new(
            r#"Classify the user's query intent. Choose ONE of these intents:

{{intents}}

If the query is a short question about dates, deadlines, funding amounts, requirements or the application process WITHOUT naming a specific grant, and grants were recently discussed, classify it as "followup", not "discovery".

Recent conversation:
{{history}}

Recently discussed grants: {{discussed}}

User query: "{{query}}"

Respond in JSON:
{
    "intent": "the intent type",
    "confidence": 0.0-1.0,
    "reasoning": "why you chose this intent",
    "referenced_grants": ["grant names if referring to specific ones"]
}"#,
        )
    }

    #[must_use]
    pub fn profile_extraction() -> PromptTemplate {
        PromptTemplate::new(
            r#"Extract user profile information from this message.

EXISTING PROFILE:
{{profile}}

NEW MESSAGE:
"{{message}}"

Return JSON containing only fields that are mentioned or can be inferred; use null otherwise:
{
    "organization_type": "SME|university|charity|NHS|large_company|null",
    "sector": ["sector1", "sector2"],
    "has_partnerships": true|false|null,
    "has_patented_tech": true|false|null,
    "team_size": "small|medium|large|null",
    "funding_range": {"min": number, "max": number} | null,
    "project_stage": "early|development|commercialization|null"
}
Team size: small is under 10 people, medium 10 to 50, large over 50."#,
        )
    }

    #[must_use]
    pub fn advice() -> PromptTemplate {
        PromptTemplate::new(
            r#"USER PROFILE:
{{profile}}

CONVERSATION HISTORY:
{{history}}
{{discussed}}

MATCHED GRANTS:
{{grants}}

CURRENT QUERY: "{{query}}"

{{guidance}}"#,
        )
    }

    /// Closing instruction for the advice prompt, by situation
    #[must_use]
    pub fn advice_guidance(no_match: bool, followup: bool) -> &'static str {
        if no_match {
            "No grant cleared the relevance and eligibility checks. Say so plainly, explain what kind of funding would fit instead, and ask one question that would help refine the search."
        } else if followup {
            "The user is asking about the grants just discussed. Answer about those grants specifically, using the details above."
        } else {
            "Give strategic advice that analyses the user's situation against the grant requirements, names strengths and gaps, suggests concrete next steps and ends with a strategic follow-up question. Be conversational; only use bullet points when comparing criteria."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_variables() {
        let template = PromptTemplate::new("Grant {{title}} closes {{deadline}}.");
        assert_eq!(template.variables(), &["title", "deadline"]);
    }

    #[test]
    fn test_template_render() {
        let template = PromptTemplate::new("Hello {{name}}!");
        let values = HashMap::from([("name", "team".to_string())]);
        assert_eq!(template.render(&values), "Hello team!");
    }

    #[test]
    fn test_json_braces_are_not_variables() {
        let template = GrantPrompts::intent_classification();
        assert_eq!(
            template.variables(),
            &["intents", "history", "discussed", "query"]
        );
    }
}
