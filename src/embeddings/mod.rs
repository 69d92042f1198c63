//! Embedding generation and grant indexing
//!
//! Queries and grant text are embedded through an OpenAI-compatible
//! `/embeddings` endpoint or a local Ollama server, then stored as
//! pgvector chunks.

pub mod client;
pub mod indexer;
pub mod text;

pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;
pub use indexer::GrantIndexer;
pub use indexer::IndexStats;
