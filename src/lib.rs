pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;
pub mod session;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod errors_tests;

pub use config::AppConfig;
pub use errors::*;
