//! Pipeline orchestration: retrieval fan-out into two generation flows.
//!
//! The orchestrator owns one execution end to end: embed the request,
//! retrieve reference material from the four corpora, run flows "A" and "B"
//! concurrently (three sequential stages each), fan back in and persist the
//! artifacts. Progress is reported through the job's [`JobHandle`]; the
//! orchestrator never touches the job record itself.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::config::CorpusConfig;
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, LlmError, RetrievalError};
use crate::llm::Generator;
use crate::pipeline::prompts;
use crate::pipeline::{DraftRequest, FlowResult, PipelineResult};
use crate::retrieval::{
    Retriever, ScoredPoint, CROSS_EVIDENCE_LIMIT, SECONDARY_EVIDENCE_LIMIT, TEMPLATES_LIMIT,
    TONES_LIMIT,
};
use crate::scheduler::{JobHandle, JobStage};
use crate::storage::{OutputError, OutputWriter};

/// Progress checkpoints reported during one execution. The scheduler owns
/// 0-5 (submission and start) and 100 (completion).
const RETRIEVAL_PROGRESS: u8 = 20;
const CORPUS_READY_PROGRESS: u8 = 40;
const FLOW_DRAFT_PROGRESS: u8 = 45;
const FLOW_TONE_PROGRESS: u8 = 60;
const FLOW_EVIDENCE_PROGRESS: u8 = 75;
const FAN_IN_PROGRESS: u8 = 85;

/// Names of the two generation flows, in draw order.
const FLOW_NAMES: [&str; 2] = ["A", "B"];

/// Errors raised during one pipeline execution.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The embedding call failed.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// A corpus search failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// A generation stage failed.
    #[error("Generation failed: {0}")]
    Llm(#[from] LlmError),

    /// The finished artifacts could not be persisted.
    #[error("Output persistence failed: {0}")]
    Output(#[from] OutputError),
}

/// Runs the staged generation pipeline for one job.
///
/// Shared across all interleaved jobs; holds only `Arc`'d collaborators and
/// per-construction configuration.
pub struct PipelineOrchestrator {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    corpora: CorpusConfig,
    writer: OutputWriter,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        corpora: CorpusConfig,
        writer: OutputWriter,
    ) -> Self {
        Self {
            embedder,
            retriever,
            generator,
            corpora,
            writer,
        }
    }

    /// Executes the full pipeline for one job and persists its artifacts.
    ///
    /// Returns the result and the output directory on success; the caller
    /// finalizes the job record. On error nothing has been persisted,
    /// because all writes happen after both flows have finished.
    pub async fn run(
        &self,
        job_id: Uuid,
        handle: &JobHandle,
        request: &DraftRequest,
    ) -> Result<(PipelineResult, PathBuf), PipelineError> {
        tracing::info!(job_id = %job_id, title = %request.title, "Pipeline started");

        let vector = self.embedder.embed(&request.embedding_text()).await?;
        handle.advance(
            JobStage::Retrieval,
            RETRIEVAL_PROGRESS,
            Some("检索参考语料".to_string()),
            serde_json::Map::new(),
        );

        let (templates, tones, cross, secondary) = tokio::try_join!(
            self.retriever
                .search(&self.corpora.templates, &vector, TEMPLATES_LIMIT),
            self.retriever
                .search(&self.corpora.tones, &vector, TONES_LIMIT),
            self.retriever
                .search(&self.corpora.cross_evidence, &vector, CROSS_EVIDENCE_LIMIT),
            self.retriever.search(
                &self.corpora.secondary_evidence,
                &vector,
                SECONDARY_EVIDENCE_LIMIT
            ),
        )?;

        let evidence: Vec<ScoredPoint> = cross.into_iter().chain(secondary).collect();
        let tones = order_by_voice(tones, request.voice.as_deref());

        let mut counts = serde_json::Map::new();
        counts.insert("templates".to_string(), templates.len().into());
        counts.insert("tones".to_string(), tones.len().into());
        counts.insert("evidence".to_string(), evidence.len().into());
        handle.advance(
            JobStage::Draft,
            CORPUS_READY_PROGRESS,
            Some("语料就绪，开始生成".to_string()),
            counts,
        );

        // First error cancels the sibling flow; nothing is persisted until
        // both flows have finished.
        let (flow_a, flow_b) = tokio::try_join!(
            self.run_flow(handle, request, 0, &templates, &tones, &evidence),
            self.run_flow(handle, request, 1, &templates, &tones, &evidence),
        )?;

        handle.advance(
            JobStage::Evidence,
            FAN_IN_PROGRESS,
            Some("汇总两路文案".to_string()),
            serde_json::Map::new(),
        );

        let result = PipelineResult {
            job_id,
            title: request.title.clone(),
            final_a: flow_a.final_text.clone(),
            final_b: flow_b.final_text.clone(),
            flows: BTreeMap::from([
                (flow_a.flow.clone(), flow_a),
                (flow_b.flow.clone(), flow_b),
            ]),
        };

        let output_dir = self.writer.persist(&result).await?;

        tracing::info!(job_id = %job_id, "Pipeline finished");
        Ok((result, output_dir))
    }

    /// Runs one flow's three sequential stages: draft, tone, evidence.
    async fn run_flow(
        &self,
        handle: &JobHandle,
        request: &DraftRequest,
        index: usize,
        templates: &[ScoredPoint],
        tones: &[ScoredPoint],
        evidence: &[ScoredPoint],
    ) -> Result<FlowResult, PipelineError> {
        let flow = FLOW_NAMES[index % FLOW_NAMES.len()];
        let template = pick(templates, index);
        let tone = pick(tones, index);
        let evidence_item = pick(evidence, index);

        handle.advance_flow(flow, JobStage::Draft, FLOW_DRAFT_PROGRESS);
        let draft_prompt =
            prompts::build_draft_prompt(&request.title, template.str_field("content"));
        let draft = self
            .generator
            .generate(prompts::DRAFT_SYSTEM_PROMPT, &draft_prompt)
            .await?;
        tracing::debug!(flow = %flow, chars = draft.chars().count(), "Draft stage finished");

        handle.advance_flow(flow, JobStage::Tone, FLOW_TONE_PROGRESS);
        let guideline = prompts::resolve_tone_guideline(&tone, request.voice.as_deref());
        let tone_prompt = prompts::build_tone_prompt(&request.title, &guideline, &draft);
        let toned = self
            .generator
            .generate(prompts::TONE_SYSTEM_PROMPT, &tone_prompt)
            .await?;

        handle.advance_flow(flow, JobStage::Evidence, FLOW_EVIDENCE_PROGRESS);
        let evidence_prompt = prompts::build_evidence_prompt(
            &request.title,
            evidence_item.str_field("content"),
            &toned,
        );
        let final_text = self
            .generator
            .generate(prompts::EVIDENCE_SYSTEM_PROMPT, &evidence_prompt)
            .await?;

        Ok(FlowResult {
            flow: flow.to_string(),
            template: template.to_value(),
            tone: tone.to_value(),
            evidence: evidence_item.to_value(),
            draft,
            toned,
            final_text,
        })
    }
}

/// Stable-partitions tone candidates: those whose `name` matches the
/// requested voice come first, everything else keeps its ranked order.
fn order_by_voice(tones: Vec<ScoredPoint>, voice: Option<&str>) -> Vec<ScoredPoint> {
    let Some(voice) = voice.filter(|v| !v.is_empty()) else {
        return tones;
    };
    let (mut matching, rest): (Vec<_>, Vec<_>) = tones
        .into_iter()
        .partition(|point| point.str_field("name") == voice);
    matching.extend(rest);
    matching
}

/// Draws one corpus item for a flow, cycling when the corpus is smaller
/// than the flow count. An empty corpus yields an empty placeholder so the
/// stage prompts still build.
fn pick(points: &[ScoredPoint], index: usize) -> ScoredPoint {
    if points.is_empty() {
        ScoredPoint {
            payload: serde_json::Map::new(),
            score: 0.0,
        }
    } else {
        points[index % points.len()].clone()
    }
}
