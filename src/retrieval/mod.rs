//! Similarity retrieval of reference material.
//!
//! The pipeline consumes retrieval through the [`Retriever`] trait: corpus
//! collection name and query vector in, ranked payload/score pairs out. The
//! concrete client talks to the Qdrant REST search endpoint.
//!
//! Per-corpus result limits are fixed: two templates (one per flow), one
//! tone, one cross-evidence item and one secondary-evidence item.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::RetrievalError;

/// Result limit for the templates corpus.
pub const TEMPLATES_LIMIT: usize = 2;
/// Result limit for the tones corpus.
pub const TONES_LIMIT: usize = 1;
/// Result limit for the cross-evidence corpus.
pub const CROSS_EVIDENCE_LIMIT: usize = 1;
/// Result limit for the secondary-evidence corpus.
pub const SECONDARY_EVIDENCE_LIMIT: usize = 1;

/// One ranked retrieval hit: free-form payload plus similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// Key/value payload stored with the point.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Similarity score reported by the backend.
    pub score: f32,
}

impl ScoredPoint {
    /// Returns a string field of the payload, or "" when absent.
    pub fn str_field(&self, key: &str) -> &str {
        self.payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Returns the payload with the score folded in, for result reporting.
    pub fn to_value(&self) -> serde_json::Value {
        let mut map = self.payload.clone();
        map.insert("score".to_string(), serde_json::Value::from(self.score));
        serde_json::Value::Object(map)
    }
}

/// Trait for collaborators that can run a similarity search.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Searches one collection, returning up to `limit` ranked points.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    payload: serde_json::Map<String, serde_json::Value>,
    score: f32,
}

/// Client for the Qdrant REST search API.
pub struct QdrantClient {
    base_url: String,
    api_key: Option<String>,
    http_client: Client,
}

impl QdrantClient {
    /// Creates a new Qdrant client.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.qdrant_url.clone(), settings.qdrant_api_key.clone())
    }
}

#[async_trait]
impl Retriever for QdrantClient {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RetrievalError> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);

        tracing::debug!(collection = %collection, limit = limit, "Searching collection");

        let mut request = self.http_client.post(&url).json(&SearchRequest {
            vector,
            limit,
            with_payload: true,
        });
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RetrievalError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RetrievalError::ApiError {
                collection: collection.to_string(),
                code: status.as_u16(),
                message,
            });
        }

        let parsed = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| RetrievalError::ParseError(e.to_string()))?;

        Ok(parsed
            .result
            .into_iter()
            .map(|hit| ScoredPoint {
                payload: hit.payload,
                score: hit.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_point_str_field() {
        let mut payload = serde_json::Map::new();
        payload.insert("content".to_string(), serde_json::Value::from("模板句式"));
        let point = ScoredPoint {
            payload,
            score: 0.92,
        };

        assert_eq!(point.str_field("content"), "模板句式");
        assert_eq!(point.str_field("missing"), "");
    }

    #[test]
    fn test_scored_point_to_value_folds_score() {
        let mut payload = serde_json::Map::new();
        payload.insert("name".to_string(), serde_json::Value::from("理性专家"));
        let point = ScoredPoint {
            payload,
            score: 0.5,
        };

        let value = point.to_value();
        assert_eq!(value["name"], "理性专家");
        assert_eq!(value["score"], 0.5);
    }

    #[test]
    fn test_search_response_parsing_defaults_payload() {
        let raw = r#"{"result": [{"score": 0.7}, {"score": 0.6, "payload": {"k": "v"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.result.len(), 2);
        assert!(parsed.result[0].payload.is_empty());
        assert_eq!(parsed.result[1].payload["k"], "v");
    }

    #[test]
    fn test_corpus_limits() {
        assert_eq!(TEMPLATES_LIMIT, 2);
        assert_eq!(TONES_LIMIT, 1);
        assert_eq!(CROSS_EVIDENCE_LIMIT, 1);
        assert_eq!(SECONDARY_EVIDENCE_LIMIT, 1);
    }
}
