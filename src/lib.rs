//! copyforge: retrieval-backed copywriting pipeline.
//!
//! This library accepts content-generation requests (a title plus voice and
//! intent metadata), runs them through a staged generation pipeline backed
//! by similarity retrieval of reference material, and produces two
//! independently generated final drafts per request. Work is submitted
//! asynchronously; callers poll for stage, progress and result.

// Core modules
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod scheduler;
pub mod storage;

// Re-export commonly used error types
pub use error::{ApiError, EmbeddingError, LlmError, RetrievalError};
