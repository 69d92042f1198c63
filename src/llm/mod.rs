//! Language-model collaborators: intent classification, profile extraction
//! and advice generation over an OpenAI-compatible chat-completions API

pub mod prompts;
pub mod streaming;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

pub use prompts::GrantPrompts;
pub use prompts::PromptTemplate;
pub use streaming::StreamingResponse;

use crate::config::AppConfig;
use crate::errors::GrantScoutError;
use crate::errors::Result;
use crate::intent::PrimaryIntent;
use crate::models::Candidate;
use crate::models::FundingRange;
use crate::models::Intent;
use crate::models::Message;
use crate::models::Profile;
use crate::rag::context::ContextAssembler;
use crate::session::ConversationContext;

/// Temperature for the deterministic JSON roles
const CLASSIFIER_TEMPERATURE: f32 = 0.1;
const CLASSIFIER_MAX_TOKENS: usize = 400;

/// First-stage intent classification
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str, context: &ConversationContext) -> Result<PrimaryIntent>;
}

/// Extracts profile facts from a single user message
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    /// Partial profile holding only what the message states or implies
    async fn extract(&self, message: &str, existing: &Profile) -> Result<Profile>;
}

/// Everything the advisor sees for one turn
#[derive(Debug, Clone)]
pub struct AdviceRequest {
    pub query: String,
    pub intent: Intent,
    pub grants: Vec<Candidate>,
    pub profile: Profile,
    pub history: Vec<Message>,
    pub discussed_grants: Vec<String>,
    pub no_match: bool,
}

/// Produces the prose answer for a turn
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn generate(&self, request: &AdviceRequest) -> Result<String>;

    async fn generate_stream(&self, request: &AdviceRequest) -> Result<StreamingResponse>;
}

/// Chat message in the completions wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible chat endpoint
pub struct LlmService {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    classifier_model: String,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
    assembler: ContextAssembler,
}

impl LlmService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GrantScoutError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.llm_endpoint().trim_end_matches('/').to_string(),
            api_key: config.llm_key().to_string(),
            model: config.llm_model().to_string(),
            classifier_model: config.llm.classifier_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout_secs: config.llm.timeout_secs,
            assembler: ContextAssembler::default(),
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Calling chat completions API: {} ({})", url, request.model);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GrantScoutError::Timeout {
                    service: "language model".to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                GrantScoutError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GrantScoutError::Llm(format!(
                "chat API error ({status}): {error_text}"
            )));
        }
        Ok(response)
    }

    /// One non-streaming completion
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
        max_tokens: usize,
        json: bool,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
            response_format: json.then_some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };
        let response: ChatResponse = self
            .send(&request)
            .await?
            .json()
            .await
            .map_err(|e| GrantScoutError::Llm(format!("Failed to parse response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GrantScoutError::Llm("No choices in response".to_string()))
    }

    /// JSON-mode completion on the classifier model
    async fn chat_json(&self, prompt: String) -> Result<Value> {
        let content = self
            .chat(
                &[ChatMessage::user(prompt)],
                &self.classifier_model,
                CLASSIFIER_TEMPERATURE,
                CLASSIFIER_MAX_TOKENS,
                true,
            )
            .await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Streaming completion yielding text deltas
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<StreamingResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: None,
            stream: true,
        };
        let response = self.send(&request).await?;
        Ok(streaming::sse_text_stream(response.bytes_stream()))
    }

    fn advice_messages(&self, request: &AdviceRequest) -> Vec<ChatMessage> {
        let discussed = if request.discussed_grants.is_empty() {
            String::new()
        } else {
            format!("Recently discussed: {}", request.discussed_grants.join(", "))
        };
        let values = HashMap::from([
            ("profile", self.assembler.format_profile(&request.profile)),
            ("history", self.assembler.format_conversation(&request.history)),
            ("discussed", discussed),
            ("grants", self.assembler.assemble_grants(&request.grants)),
            ("query", request.query.clone()),
            (
                "guidance",
                GrantPrompts::advice_guidance(request.no_match, request.intent == Intent::Followup)
                    .to_string(),
            ),
        ]);
        vec![
            ChatMessage::system(GrantPrompts::advisor_system()),
            ChatMessage::user(GrantPrompts::advice().render(&values)),
        ]
    }
}

#[async_trait]
impl IntentClassifier for LlmService {
    async fn classify(&self, query: &str, context: &ConversationContext) -> Result<PrimaryIntent> {
        let intents = Intent::ALL
            .iter()
            .map(|intent| format!("- {}: {}", intent, intent.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let recent = context.recent_distinct_grants(5);
        let values = HashMap::from([
            ("intents", intents),
            ("history", self.assembler.format_conversation(&context.messages)),
            (
                "discussed",
                if recent.is_empty() {
                    "None".to_string()
                } else {
                    recent.join(", ")
                },
            ),
            ("query", query.to_string()),
        ]);
        let value = self
            .chat_json(GrantPrompts::intent_classification().render(&values))
            .await?;
        Ok(parse_primary_intent(&value))
    }
}

#[async_trait]
impl ProfileExtractor for LlmService {
    async fn extract(&self, message: &str, existing: &Profile) -> Result<Profile> {
        let values = HashMap::from([
            ("profile", serde_json::to_string_pretty(existing)?),
            ("message", message.to_string()),
        ]);
        let value = self
            .chat_json(GrantPrompts::profile_extraction().render(&values))
            .await?;
        Ok(parse_profile_update(&value))
    }
}

#[async_trait]
impl AdviceGenerator for LlmService {
    async fn generate(&self, request: &AdviceRequest) -> Result<String> {
        let messages = self.advice_messages(request);
        self.chat(
            &messages,
            &self.model,
            self.temperature,
            self.max_tokens,
            false,
        )
        .await
    }

    async fn generate_stream(&self, request: &AdviceRequest) -> Result<StreamingResponse> {
        let messages = self.advice_messages(request);
        self.chat_stream(&messages).await
    }
}

/// Read a classifier verdict; unknown labels become discovery
pub fn parse_primary_intent(value: &Value) -> PrimaryIntent {
    let label = value.get("intent").and_then(Value::as_str).unwrap_or("");
    let intent = Intent::from_str(label).unwrap_or_else(|_| {
        warn!("Unknown intent label '{}', using discovery", label);
        Intent::Discovery
    });
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .map_or(0.0, |c| c.clamp(0.0, 1.0) as f32);
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let referenced_grant_names = value
        .get("referenced_grants")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PrimaryIntent {
        intent,
        confidence,
        reasoning,
        referenced_grant_names,
    }
}

fn field<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) if s.eq_ignore_ascii_case("null") || s.is_empty() => None,
        v => serde_json::from_value(v.clone()).ok(),
    }
}

/// Read an extractor reply field by field. Fields with an unexpected shape
/// count as not mentioned, so a malformed reply is simply an empty update.
pub fn parse_profile_update(value: &Value) -> Profile {
    let sector = value
        .get("sector")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let funding_range = value.get("funding_range").and_then(|range| {
        let min = range.get("min").and_then(Value::as_f64);
        let max = range.get("max").and_then(Value::as_f64);
        (min.is_some() || max.is_some()).then(|| FundingRange {
            min: min.unwrap_or(0.0),
            max,
        })
    });

    Profile {
        organization_type: field(value, "organization_type"),
        sector,
        has_partnerships: field(value, "has_partnerships"),
        has_patented_tech: field(value, "has_patented_tech"),
        team_size: field(value, "team_size"),
        funding_range,
        project_stage: field(value, "project_stage"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::OrganizationType;
    use crate::models::ProjectStage;

    #[test]
    fn test_parse_primary_intent() {
        let parsed = parse_primary_intent(&json!({
            "intent": "comparative",
            "confidence": 0.92,
            "reasoning": "which one",
            "referenced_grants": ["Biomedical Catalyst", " "]
        }));
        assert_eq!(parsed.intent, Intent::Comparative);
        assert!((parsed.confidence - 0.92).abs() < 1e-6);
        assert_eq!(parsed.referenced_grant_names, vec!["Biomedical Catalyst"]);
    }

    #[test]
    fn test_unknown_intent_label_is_discovery() {
        let parsed = parse_primary_intent(&json!({"intent": "chitchat", "confidence": 3}));
        assert_eq!(parsed.intent, Intent::Discovery);
        assert_eq!(parsed.confidence, 1.0);
    }

    #[test]
    fn test_parse_profile_update() {
        let update = parse_profile_update(&json!({
            "organization_type": "university",
            "sector": ["Biomedical", "digital_health"],
            "has_partnerships": null,
            "team_size": "null",
            "funding_range": {"min": 100000, "max": 500000},
            "project_stage": "early",
            "other_notes": "ignored"
        }));
        assert_eq!(update.organization_type, Some(OrganizationType::University));
        assert!(update.sector.contains("biomedical"));
        assert_eq!(update.has_partnerships, None);
        assert_eq!(update.team_size, None);
        assert_eq!(update.funding_range.and_then(|r| r.max), Some(500_000.0));
        assert_eq!(update.project_stage, Some(ProjectStage::Early));
    }

    #[test]
    fn test_malformed_profile_reply_is_empty() {
        assert!(parse_profile_update(&json!({"organization_type": 7, "sector": "x"})).is_empty());
        assert!(parse_profile_update(&json!(["not", "an", "object"])).is_empty());
    }

    #[test]
    fn test_chat_request_serialization() {
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.1,
            max_tokens: 10,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert!(value.get("stream").is_none());
    }
}
