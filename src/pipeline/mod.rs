//! Staged content-generation pipeline.
//!
//! One pipeline execution turns a `DraftRequest` into a `PipelineResult`:
//! it embeds the request, retrieves reference material from four corpora,
//! fans out two concurrent generation flows ("A" and "B") of three
//! sequential stages each (draft, tone, evidence), fans back in and
//! persists the artifacts atomically.

pub mod orchestrator;
pub mod prompts;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use orchestrator::{PipelineError, PipelineOrchestrator};

/// A content-generation request as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    /// Title to write copy for.
    pub title: String,
    /// Optional free-form description of the intent.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional requested voice; matching tone candidates sort first.
    #[serde(default)]
    pub voice: Option<String>,
}

impl DraftRequest {
    /// Creates a request with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            voice: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the requested voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Returns the text used for the embedding call: title and description
    /// joined by a newline.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.description.as_deref().unwrap_or(""))
    }
}

/// The output of one generation flow.
///
/// Ephemeral: owned by the orchestrator for the duration of one pipeline
/// execution, then folded into the `PipelineResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    /// Flow name, "A" or "B".
    pub flow: String,
    /// Template payload the flow drew.
    pub template: serde_json::Value,
    /// Tone payload the flow drew.
    pub tone: serde_json::Value,
    /// Evidence payload the flow drew.
    pub evidence: serde_json::Value,
    /// Output of the draft stage.
    pub draft: String,
    /// Output of the tone stage.
    pub toned: String,
    /// Output of the evidence stage.
    #[serde(rename = "final")]
    pub final_text: String,
}

/// The combined result of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Job this result belongs to.
    pub job_id: Uuid,
    /// Title the copy was written for.
    pub title: String,
    /// Final text of flow A.
    pub final_a: String,
    /// Final text of flow B.
    pub final_b: String,
    /// Full per-flow detail keyed by flow name.
    pub flows: BTreeMap<String, FlowResult>,
}
