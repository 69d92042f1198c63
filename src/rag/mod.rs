//! Grant retrieval and ranking
//!
//! A turn flows through these stages:
//! - candidate sourcing (fresh retrieval, carried-over grants or named grants)
//! - aggregation of vector hits into one candidate per grant
//! - keyword score adjustment
//! - programme-name partitioning
//! - eligibility filtering and fit scoring
//! - open/closed tiering with threshold relaxation and diversity re-ranking
//! - response assembly
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use grantscout::config::AppConfig;
//! use grantscout::rag::GrantSearchService;
//! use grantscout::rag::SearchRequest;
//! use grantscout::session::InMemoryConversationStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let store = Arc::new(InMemoryConversationStore::new(config.session.timeout_secs));
//!     let service = GrantSearchService::from_config(&config, store).await?;
//!
//!     let outcome = service
//!         .chat(SearchRequest {
//!             query: "Funding for a digital health startup".to_string(),
//!             session_id: "demo".to_string(),
//!             ..SearchRequest::default()
//!         })
//!         .await?;
//!     println!("{}", outcome.answer);
//!     println!("{} grants", outcome.grants.len());
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod assembler;
pub mod boost;
pub mod context;
pub mod eligibility;
pub mod name_filter;
pub mod pipeline;
pub mod retriever;
pub mod selection;
pub mod sources;

pub use aggregator::CandidateAggregator;
pub use aggregator::RecordFilter;
pub use assembler::ResponseAssembler;
pub use boost::ScoreAdjuster;
pub use context::ContextAssembler;
pub use eligibility::EligibilityEngine;
pub use pipeline::ChatOutcome;
pub use pipeline::Collaborators;
pub use pipeline::GrantSearchService;
pub use pipeline::PreparedTurn;
pub use pipeline::SearchRequest;
pub use retriever::GrantRepository;
pub use retriever::Retriever;
pub use retriever::VectorRetriever;
pub use selection::Selection;
pub use selection::ThresholdPolicy;
pub use selection::TieringSelector;
