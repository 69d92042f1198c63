//! Embedding API clients for OpenAI-compatible and Ollama endpoints

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::EmbeddingsConfig;
use crate::errors::GrantScoutError;
use crate::errors::Result;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// `OpenAI`-compatible `/embeddings` API
    OpenAI,
    /// Ollama local embeddings
    Ollama,
}

impl EmbeddingProvider {
    /// Ollama when the key says so or the endpoint is the Ollama default port
    #[must_use]
    pub fn detect(config: &EmbeddingsConfig) -> Self {
        let key_says_ollama = config
            .api_key
            .as_deref()
            .is_some_and(|key| key.eq_ignore_ascii_case("ollama"));
        if key_says_ollama || config.endpoint.contains(":11434") {
            Self::Ollama
        } else {
            Self::OpenAI
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

/// Client for generating embeddings
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    dimension: usize,
    client: Client,
}

impl EmbeddingClient {
    pub fn new(
        provider: EmbeddingProvider,
        model: String,
        endpoint: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GrantScoutError::Http(e.to_string()))?;

        Ok(Self {
            provider,
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            dimension,
            client,
        })
    }

    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self> {
        Self::new(
            EmbeddingProvider::detect(config),
            config.model.clone(),
            config.endpoint.clone(),
            config.api_key.clone(),
            config.dimension,
        )
    }

    #[must_use]
    pub const fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    /// Generate embedding for a single text
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.provider {
            EmbeddingProvider::OpenAI => self
                .generate_openai(vec![text])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    GrantScoutError::Embedding("No embedding in response".to_string())
                })?,
            EmbeddingProvider::Ollama => self.generate_ollama(text).await?,
        };
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    /// Generate embeddings for multiple texts, in input order
    pub async fn generate_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = match self.provider {
            EmbeddingProvider::OpenAI => self.generate_openai(texts).await?,
            EmbeddingProvider::Ollama => {
                // Ollama has no batch endpoint
                use futures::stream::StreamExt;
                use futures::stream::{
                    self,
                };

                let concurrency = texts.len().min(8);
                let results: Vec<Result<Vec<f32>>> = stream::iter(texts)
                    .map(|text| async move { self.generate_ollama(text).await })
                    .buffered(concurrency)
                    .collect()
                    .await;
                results.into_iter().collect::<Result<Vec<_>>>()?
            }
        };
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() == self.dimension {
            Ok(())
        } else {
            Err(GrantScoutError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                embedding.len()
            )))
        }
    }

    async fn post_json<Req: Serialize + Sync, Resp: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        request: &Req,
        bearer: Option<&str>,
    ) -> Result<Resp> {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = bearer {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GrantScoutError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GrantScoutError::Embedding(format!(
                "{:?} API error ({status}): {error_text}",
                self.provider
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GrantScoutError::Embedding(format!("Failed to parse response: {e}")))
    }

    async fn generate_openai(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.endpoint);
        debug!("Calling embeddings API: {} ({} items)", url, texts.len());

        let expected = texts.len();
        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
        };
        let result: OpenAIResponse = self
            .post_json(&url, &request, self.api_key.as_deref())
            .await?;

        if result.data.len() != expected {
            return Err(GrantScoutError::Embedding(format!(
                "expected {expected} embeddings, got {}",
                result.data.len()
            )));
        }
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn generate_ollama(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let result: OllamaResponse = self.post_json(&url, &request, None).await?;
        Ok(result.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str, api_key: Option<&str>) -> EmbeddingsConfig {
        EmbeddingsConfig {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(
            EmbeddingProvider::detect(&config("https://api.openai.com/v1", Some("sk-x"))),
            EmbeddingProvider::OpenAI
        );
        assert_eq!(
            EmbeddingProvider::detect(&config("http://localhost:11434", None)),
            EmbeddingProvider::Ollama
        );
        assert_eq!(
            EmbeddingProvider::detect(&config("http://gpu-box:8080", Some("ollama"))),
            EmbeddingProvider::Ollama
        );
    }

    #[test]
    fn test_dimension_check() {
        let client = EmbeddingClient::from_config(&config("http://localhost:11434/", None)).unwrap();
        assert!(client.check_dimension(&vec![0.0; 1536]).is_ok());
        assert!(client.check_dimension(&[0.0; 3]).is_err());
        assert_eq!(client.endpoint, "http://localhost:11434");
    }

    #[tokio::test]
    #[ignore = "Requires API key"]
    async fn test_openai_embedding() {
        let client = EmbeddingClient::new(
            EmbeddingProvider::OpenAI,
            "text-embedding-3-small".to_string(),
            "https://api.openai.com/v1".to_string(),
            std::env::var("OPENAI_API_KEY").ok(),
            1536,
        )
        .unwrap();

        let embedding = client.generate("Hello, world!").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }
}
