//! Asynchronous job scheduling and lookup.
//!
//! The scheduler owns the job registry and an admission gate (a semaphore
//! capped at the configured concurrency). `submit` returns a fresh job id
//! immediately; the pipeline executes on a spawned task once a permit is
//! available. Each job gets a dedicated updater task that applies progress
//! events to the record, so the two pipeline flows never race on it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::config::Settings;
use crate::embedding::EmbeddingClient;
use crate::error::ApiError;
use crate::llm::ChatClient;
use crate::pipeline::{DraftRequest, PipelineOrchestrator, PipelineResult};
use crate::retrieval::QdrantClient;
use crate::scheduler::{JobHandle, JobRecord, JobStatusView};
use crate::storage::OutputWriter;

/// Accepts jobs, runs them under the admission gate and answers lookups.
pub struct JobScheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    writer: OutputWriter,
    registry: Arc<Mutex<HashMap<Uuid, JobRecord>>>,
    gate: Arc<Semaphore>,
}

impl JobScheduler {
    /// Creates a scheduler over the given orchestrator. The writer must be
    /// rooted at the same directory the orchestrator persists into.
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        writer: OutputWriter,
        max_concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            writer,
            registry: Arc::new(Mutex::new(HashMap::new())),
            gate: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Wires up the production collaborators from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let writer = OutputWriter::new(settings.output_dir.clone());
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(EmbeddingClient::from_settings(settings)),
            Arc::new(QdrantClient::from_settings(settings)),
            Arc::new(ChatClient::from_settings(settings)),
            settings.corpora.clone(),
            writer.clone(),
        );
        Self::new(Arc::new(orchestrator), writer, settings.max_concurrency)
    }

    /// Returns the artifact directory assigned to one job.
    pub fn job_output_dir(&self, job_id: Uuid) -> std::path::PathBuf {
        self.writer.job_dir(job_id)
    }

    /// Registers a new job and returns its id immediately.
    ///
    /// The record starts in Pending; it moves to Running only once the
    /// spawned execution task has acquired an admission permit, so a queued
    /// job polls as Pending for as long as it waits.
    pub async fn submit(&self, request: DraftRequest) -> Uuid {
        let job_id = Uuid::new_v4();

        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), request.title.clone().into());
        if let Some(voice) = &request.voice {
            payload.insert("voice".to_string(), voice.clone().into());
        }

        {
            let mut registry = self.registry.lock().await;
            registry.insert(job_id, JobRecord::new(job_id, payload));
        }
        tracing::info!(job_id = %job_id, title = %request.title, "Job submitted");

        let (handle, mut rx) = JobHandle::new(job_id);

        let updater = tokio::spawn({
            let registry = Arc::clone(&self.registry);
            async move {
                while let Some(event) = rx.recv().await {
                    if let Some(record) = registry.lock().await.get_mut(&job_id) {
                        record.apply(event);
                    }
                }
            }
        });

        let orchestrator = Arc::clone(&self.orchestrator);
        let registry = Arc::clone(&self.registry);
        let gate = Arc::clone(&self.gate);
        tokio::spawn(async move {
            let outcome = match gate.acquire_owned().await {
                Ok(_permit) => {
                    handle.started(serde_json::Map::new());
                    orchestrator
                        .run(job_id, &handle, &request)
                        .await
                        .map_err(|e| e.to_string())
                }
                Err(_) => Err("admission gate closed".to_string()),
            };

            // Drain all progress events before finalizing, so the terminal
            // transition is the last write the record sees.
            drop(handle);
            let _ = updater.await;

            let mut registry = registry.lock().await;
            let Some(record) = registry.get_mut(&job_id) else {
                return;
            };
            match outcome {
                Ok((result, output_dir)) => {
                    tracing::info!(job_id = %job_id, dir = %output_dir.display(), "Job finished");
                    if let Err(e) = record.complete(result) {
                        tracing::error!(job_id = %job_id, error = %e, "Completion rejected");
                    }
                }
                Err(message) => {
                    tracing::error!(job_id = %job_id, error = %message, "Job failed");
                    record.fail(message);
                }
            }
        });

        job_id
    }

    /// Returns a full snapshot of one job's record.
    pub async fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.registry.lock().await.get(&job_id).cloned()
    }

    /// Returns the lifecycle snapshot of one job.
    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusView, ApiError> {
        self.registry
            .lock()
            .await
            .get(&job_id)
            .map(JobRecord::status_view)
            .ok_or(ApiError::NotFound(job_id))
    }

    /// Returns the final result of one job.
    ///
    /// Fails with `Conflict` while the job has not produced a result yet
    /// (still running, queued, or finished in error).
    pub async fn result(&self, job_id: Uuid) -> Result<PipelineResult, ApiError> {
        let registry = self.registry.lock().await;
        let record = registry.get(&job_id).ok_or(ApiError::NotFound(job_id))?;
        record.result.clone().ok_or(ApiError::Conflict(job_id))
    }

    /// Returns snapshots of all known jobs, oldest first.
    pub async fn list(&self) -> Vec<JobStatusView> {
        let registry = self.registry.lock().await;
        let mut views: Vec<_> = registry.values().map(JobRecord::status_view).collect();
        views.sort_by_key(|view| view.created_at);
        views
    }
}
