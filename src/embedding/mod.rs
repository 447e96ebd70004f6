//! Embedding client for the retrieval step.
//!
//! The pipeline consumes embeddings through the [`Embedder`] trait: text in,
//! fixed-length float vector out. The concrete client talks to an
//! OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::EmbeddingError;

/// Trait for collaborators that can embed text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Computes the dense vector for one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings API.
pub struct EmbeddingClient {
    api_base: String,
    model: String,
    http_client: Client,
}

impl EmbeddingClient {
    /// Creates a new embedding client.
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.embedding_api_base.clone(),
            settings.embedding_model.clone(),
        )
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.api_base);

        let response = self
            .http_client
            .post(&url)
            .json(&ApiRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let parsed = response
            .json::<ApiResponse>()
            .await
            .map_err(|e| EmbeddingError::ParseError(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(EmbeddingError::Empty)
    }
}
