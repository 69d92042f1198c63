use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrantScoutError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("{service} unavailable: {message}")]
    Upstream { service: String, message: String },

    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    #[error("{0}")]
    Custom(String),
}

impl GrantScoutError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Errors a collaborator can raise that the pipeline degrades around
    /// instead of failing the turn.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::Timeout { .. }
                | Self::Http(_)
                | Self::Llm(_)
                | Self::Embedding(_)
                | Self::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GrantScoutError>;
