//! Job record and lifecycle state machine.
//!
//! This module defines the core types tracked for one submitted request:
//!
//! - `JobRecord`: the mutable state object for one unit of work
//! - `JobStage`: fine-grained pipeline checkpoint
//! - `JobStatus`: coarse lifecycle state
//! - `ProgressEvent` / `JobHandle`: the channel through which pipeline
//!   flows report progress without touching the record directly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::pipeline::PipelineResult;

/// Progress floor applied when a job starts running or fails.
const PROGRESS_FLOOR: u8 = 5;

/// Errors raised by illegal state-machine transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The record was already finalized (Done or Error).
    #[error("Job '{0}' is already finalized")]
    AlreadyFinal(Uuid),
}

/// Pipeline checkpoint reported on the job record.
///
/// The stage names a step, not a flow: both generation flows report into the
/// same field, so it reads as "whichever step was most recently reached".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Init,
    Retrieval,
    Draft,
    Tone,
    Evidence,
    Done,
    Error,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Init => write!(f, "INIT"),
            JobStage::Retrieval => write!(f, "RETRIEVAL"),
            JobStage::Draft => write!(f, "DRAFT"),
            JobStage::Tone => write!(f, "TONE"),
            JobStage::Evidence => write!(f, "EVIDENCE"),
            JobStage::Done => write!(f, "DONE"),
            JobStage::Error => write!(f, "ERROR"),
        }
    }
}

/// Coarse lifecycle state, orthogonal to `JobStage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Returns whether this status is terminal (Done or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Done => write!(f, "DONE"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// The mutable state object for one submitted request.
///
/// Owned exclusively by the scheduler's registry. The orchestrator never
/// mutates it directly; it sends `ProgressEvent`s through a `JobHandle`,
/// which a per-job updater task applies via the guarded operations below.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Unique identifier, assigned at creation, immutable.
    pub job_id: Uuid,
    /// Fine-grained pipeline checkpoint.
    pub stage: JobStage,
    /// Coarse lifecycle state.
    pub status: JobStatus,
    /// Progress percentage, always within [0, 100].
    pub progress: u8,
    /// Human-readable status or failure note, replaced on every update.
    pub message: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
    /// Diagnostic annotations, merged (never replaced) on each update.
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Final output, set exactly once at completion.
    pub result: Option<PipelineResult>,
}

impl JobRecord {
    /// Creates a new record in Pending state with progress 0.
    pub fn new(job_id: Uuid, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            stage: JobStage::Init,
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            created_at: now,
            updated_at: now,
            payload,
            result: None,
        }
    }

    /// Returns whether the record is finalized.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Marks the job as running.
    ///
    /// Only Pending/Running records move to Running; a finalized record
    /// ignores the call. Resets the stage to Init, raises the progress
    /// floor to 5 and clears any previous message.
    pub fn mark_running(&mut self, extra: serde_json::Map<String, serde_json::Value>) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Running;
        self.stage = JobStage::Init;
        self.progress = self.progress.max(PROGRESS_FLOOR);
        self.message = None;
        self.merge_payload(extra);
        self.touch();
    }

    /// Records pipeline progress.
    ///
    /// Sets the stage and message, clamps progress into [0, 100] (callers
    /// are responsible for passing non-decreasing values) and merges the
    /// extra payload. A finalized record ignores the whole update, which
    /// keeps status polling of finished jobs idempotent even if a stray
    /// late event arrives.
    pub fn advance(
        &mut self,
        stage: JobStage,
        progress: u8,
        message: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        if self.is_terminal() {
            return;
        }
        self.stage = stage;
        self.status = JobStatus::Running;
        self.progress = progress.min(100);
        self.message = message;
        self.merge_payload(extra);
        self.touch();
    }

    /// Finalizes the job with its result.
    ///
    /// Sets stage and status to Done and progress to 100; progress 100 is
    /// reserved for this transition. A second call fails loudly rather than
    /// silently overwriting the result.
    pub fn complete(&mut self, result: PipelineResult) -> Result<(), StateError> {
        if self.is_terminal() {
            return Err(StateError::AlreadyFinal(self.job_id));
        }
        self.result = Some(result);
        self.stage = JobStage::Done;
        self.status = JobStatus::Done;
        self.progress = 100;
        self.message = None;
        self.touch();
        Ok(())
    }

    /// Finalizes the job with a failure message.
    ///
    /// Raises the progress floor to 5 but never decreases progress. A
    /// record that is already terminal is left untouched.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.stage = JobStage::Error;
        self.status = JobStatus::Error;
        self.message = Some(message.into());
        self.progress = self.progress.max(PROGRESS_FLOOR);
        self.touch();
    }

    /// Applies a progress event received from a pipeline flow.
    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { extra } => self.mark_running(extra),
            ProgressEvent::Advanced {
                stage,
                progress,
                message,
                extra,
            } => self.advance(stage, progress, message, extra),
        }
    }

    /// Returns a caller-facing status view of this record.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.job_id,
            stage: self.stage,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn merge_payload(&mut self, extra: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in extra {
            self.payload.insert(key, value);
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Caller-facing snapshot of a job's lifecycle fields.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub stage: JobStage,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A progress report emitted by the orchestrator or one of its flows.
#[derive(Debug)]
pub enum ProgressEvent {
    /// The orchestrator has started executing.
    Started {
        extra: serde_json::Map<String, serde_json::Value>,
    },
    /// A pipeline step was reached.
    Advanced {
        stage: JobStage,
        progress: u8,
        message: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    },
}

/// Write handle passed into the orchestrator for one job.
///
/// Events are applied to the record by a single per-job updater task, so
/// the two concurrent flows never race on the record itself. Send failures
/// are ignored: once the job is finalized the receiver is gone and late
/// events are intentionally dropped.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: Uuid,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl JobHandle {
    /// Creates a handle/receiver pair for one job.
    pub fn new(job_id: Uuid) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { job_id, tx }, rx)
    }

    /// Returns the job this handle reports into.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Reports that execution has started.
    pub fn started(&self, extra: serde_json::Map<String, serde_json::Value>) {
        let _ = self.tx.send(ProgressEvent::Started { extra });
    }

    /// Reports that a pipeline step was reached.
    pub fn advance(
        &self,
        stage: JobStage,
        progress: u8,
        message: Option<String>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        let _ = self.tx.send(ProgressEvent::Advanced {
            stage,
            progress,
            message,
            extra,
        });
    }

    /// Reports a step tagged with the flow that reached it.
    pub fn advance_flow(&self, flow: &str, stage: JobStage, progress: u8) {
        let mut extra = serde_json::Map::new();
        extra.insert("flow".to_string(), serde_json::Value::from(flow));
        self.advance(stage, progress, None, extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineResult;

    fn extra(key: &str, value: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), serde_json::Value::from(value));
        map
    }

    fn test_result(job_id: Uuid) -> PipelineResult {
        PipelineResult {
            job_id,
            title: "title".to_string(),
            final_a: "a".to_string(),
            final_b: "b".to_string(),
            flows: Default::default(),
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let id = Uuid::new_v4();
        let record = JobRecord::new(id, serde_json::Map::new());

        assert_eq!(record.job_id, id);
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.stage, JobStage::Init);
        assert_eq!(record.progress, 0);
        assert!(record.message.is_none());
        assert!(record.result.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_mark_running_raises_floor_and_clears_message() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());
        record.message = Some("stale".to_string());

        record.mark_running(extra("source", "test"));

        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.stage, JobStage::Init);
        assert_eq!(record.progress, 5);
        assert!(record.message.is_none());
        assert_eq!(record.payload["source"], "test");
    }

    #[test]
    fn test_advance_clamps_progress() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());

        record.advance(JobStage::Retrieval, 200, None, serde_json::Map::new());
        assert_eq!(record.progress, 100);
        assert_eq!(record.stage, JobStage::Retrieval);
        assert_eq!(record.status, JobStatus::Running);

        record.advance(JobStage::Draft, 40, None, serde_json::Map::new());
        assert_eq!(record.progress, 40);
    }

    #[test]
    fn test_advance_merges_payload_and_replaces_message() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());

        record.advance(
            JobStage::Draft,
            40,
            Some("drafting".to_string()),
            extra("flow", "A"),
        );
        record.advance(JobStage::Tone, 60, None, extra("flow", "B"));

        // message replaced, payload merged (last write wins per key)
        assert!(record.message.is_none());
        assert_eq!(record.payload["flow"], "B");
    }

    #[test]
    fn test_complete_sets_result_and_progress() {
        let id = Uuid::new_v4();
        let mut record = JobRecord::new(id, serde_json::Map::new());
        record.mark_running(serde_json::Map::new());

        record.complete(test_result(id)).unwrap();

        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.stage, JobStage::Done);
        assert_eq!(record.progress, 100);
        assert!(record.message.is_none());
        assert!(record.result.is_some());
    }

    #[test]
    fn test_double_complete_fails_loudly() {
        let id = Uuid::new_v4();
        let mut record = JobRecord::new(id, serde_json::Map::new());

        record.complete(test_result(id)).unwrap();
        let err = record.complete(test_result(id)).unwrap_err();

        assert_eq!(err, StateError::AlreadyFinal(id));
    }

    #[test]
    fn test_fail_sets_message_and_floor() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());

        record.fail("backend unavailable");

        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.stage, JobStage::Error);
        assert_eq!(record.progress, 5);
        assert_eq!(record.message.as_deref(), Some("backend unavailable"));
        assert!(record.result.is_none());
    }

    #[test]
    fn test_fail_never_decreases_progress() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());
        record.advance(JobStage::Tone, 60, None, serde_json::Map::new());

        record.fail("late failure");

        assert_eq!(record.progress, 60);
    }

    #[test]
    fn test_terminal_record_ignores_updates() {
        let id = Uuid::new_v4();
        let mut record = JobRecord::new(id, serde_json::Map::new());
        record.complete(test_result(id)).unwrap();

        record.advance(
            JobStage::Tone,
            60,
            Some("stray".to_string()),
            serde_json::Map::new(),
        );
        record.mark_running(serde_json::Map::new());
        record.fail("stray failure");

        assert_eq!(record.status, JobStatus::Done);
        assert_eq!(record.stage, JobStage::Done);
        assert_eq!(record.progress, 100);
        assert!(record.message.is_none());
    }

    #[test]
    fn test_failed_record_ignores_resurrection() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());
        record.fail("broken");

        record.mark_running(serde_json::Map::new());
        record.advance(JobStage::Draft, 40, None, serde_json::Map::new());

        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.message.as_deref(), Some("broken"));
    }

    #[test]
    fn test_apply_events() {
        let mut record = JobRecord::new(Uuid::new_v4(), serde_json::Map::new());

        record.apply(ProgressEvent::Started {
            extra: serde_json::Map::new(),
        });
        assert_eq!(record.status, JobStatus::Running);

        record.apply(ProgressEvent::Advanced {
            stage: JobStage::Retrieval,
            progress: 20,
            message: None,
            extra: extra("flow", "A"),
        });
        assert_eq!(record.stage, JobStage::Retrieval);
        assert_eq!(record.progress, 20);
    }

    #[tokio::test]
    async fn test_handle_delivers_events() {
        let id = Uuid::new_v4();
        let (handle, mut rx) = JobHandle::new(id);

        handle.started(serde_json::Map::new());
        handle.advance_flow("A", JobStage::Draft, 45);

        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::Started { .. })
        ));
        match rx.recv().await {
            Some(ProgressEvent::Advanced {
                stage,
                progress,
                extra,
                ..
            }) => {
                assert_eq!(stage, JobStage::Draft);
                assert_eq!(progress, 45);
                assert_eq!(extra["flow"], "A");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_handle_send_after_receiver_drop_is_ignored() {
        let (handle, rx) = JobHandle::new(Uuid::new_v4());
        drop(rx);

        // Must not panic
        handle.started(serde_json::Map::new());
        handle.advance_flow("B", JobStage::Evidence, 75);
    }

    #[test]
    fn test_stage_and_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStage::Retrieval).unwrap(),
            "\"RETRIEVAL\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(format!("{}", JobStage::Evidence), "EVIDENCE");
        assert_eq!(format!("{}", JobStatus::Running), "RUNNING");
    }
}
