//! Error types for copyforge operations.
//!
//! Defines error types for the collaborator boundaries and the caller-facing
//! lookup surface:
//! - Embedding backend calls
//! - Similarity retrieval calls
//! - Text generation (chat completion) calls
//! - Job lookup (not-found / not-finished)

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while computing an embedding vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Embedding API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Embedding response contained no vectors")]
    Empty,

    #[error("Failed to parse embedding response: {0}")]
    ParseError(String),
}

/// Errors that can occur during a similarity-search call.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Retrieval API error ({code}) for collection '{collection}': {message}")]
    ApiError {
        collection: String,
        code: u16,
        message: String,
    },

    #[error("Failed to parse retrieval response: {0}")]
    ParseError(String),
}

/// Errors that can occur during LLM generation calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("LLM API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM response contained no choices")]
    EmptyResponse,
}

/// Errors surfaced to the caller by job lookups.
///
/// These never affect a job record's state; they describe the lookup itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job '{0}' not found")]
    NotFound(Uuid),

    #[error("Job '{0}' is not finished")]
    Conflict(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let id = Uuid::new_v4();

        let err = ApiError::NotFound(id);
        assert!(err.to_string().contains("not found"));
        assert!(err.to_string().contains(&id.to_string()));

        let err = ApiError::Conflict(id);
        assert!(err.to_string().contains("not finished"));
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = LlmError::ApiError {
            code: 429,
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));

        let err = RetrievalError::ApiError {
            collection: "templates".to_string(),
            code: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.to_string().contains("templates"));

        let err = EmbeddingError::Empty;
        assert!(err.to_string().contains("no vectors"));
    }
}
