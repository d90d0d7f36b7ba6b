//! Turn Orchestrator
//!
//! Runs one chat turn through context → extraction → dedup → graph write →
//! question selection → response, tracking the turn's state machine. Turns of
//! the same session run one at a time.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::index::EmbeddingModel;
use crate::llm::LanguageModel;
use crate::models::{
    ChatRole, Edge, GraphView, NodeDetail, NodeType, NodeView, SessionGraph, TurnState,
};
use crate::observability::{PipelineMetrics, TurnStats};
use crate::services::context::ContextAssembler;
use crate::services::dedup::{DedupResolver, ResolvedCandidate};
use crate::services::extraction::{ExtractionFailureReason, ExtractionOutcome, ExtractionService};
use crate::services::graph_writer::GraphWriter;
use crate::services::locks::SessionLocks;
use crate::services::question::{NextQuestionSelector, QuestionPlan, QuestionSource, SuggestedQuestion};
use crate::storage::{GraphStore, GraphWriteBatch};

/// Longest message accepted for a single turn
pub const MAX_MESSAGE_CHARS: usize = 20_000;

const GRAPH_WRITE_FAILED_MESSAGE: &str =
    "I captured your ideas but couldn't save them to your knowledge graph. Please send that again.";

/// A node touched by this turn
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CapturedNugget {
    pub node_id: String,
    /// Only idea/story/framework nodes carry a nugget
    pub nugget_id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub score: u8,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Addition,
    Link,
    Mixed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextQuestion {
    #[serde(flatten)]
    pub question: SuggestedQuestion,
    pub why_this_next: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub turn_number: u64,
    pub captured_nuggets: Vec<CapturedNugget>,
    pub graph_update_summary: String,
    pub update_kind: UpdateKind,
    pub next_question: Option<NextQuestion>,
    pub alternate_paths: Vec<SuggestedQuestion>,
    pub new_nodes: Vec<NodeView>,
    pub new_edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionFailedResponse {
    pub session_id: String,
    pub turn_number: u64,
    pub reason: ExtractionFailureReason,
    pub message: String,
    pub recovery_question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphWriteFailedResponse {
    pub session_id: String,
    pub turn_number: u64,
    pub message: String,
    pub retryable: bool,
}

/// Result of one turn
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Captured(TurnResponse),
    ExtractionFailed(ExtractionFailedResponse),
    GraphWriteFailed(GraphWriteFailedResponse),
}

impl TurnOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            TurnOutcome::Captured(r) => &r.session_id,
            TurnOutcome::ExtractionFailed(r) => &r.session_id,
            TurnOutcome::GraphWriteFailed(r) => &r.session_id,
        }
    }
}

pub struct TurnOrchestrator {
    store: Arc<dyn GraphStore>,
    assembler: ContextAssembler,
    extractor: ExtractionService,
    resolver: DedupResolver,
    writer: GraphWriter,
    selector: NextQuestionSelector,
    config: PipelineConfig,
    locks: SessionLocks,
    metrics: Arc<PipelineMetrics>,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LanguageModel>,
        embedding: Arc<dyn EmbeddingModel>,
        config: PipelineConfig,
        locks: SessionLocks,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            assembler: ContextAssembler::new(store.clone(), embedding.clone(), config.clone()),
            extractor: ExtractionService::new(llm.clone(), config.clone()),
            resolver: DedupResolver::new(llm.clone(), embedding, config.clone()),
            writer: GraphWriter::new(store.clone(), config.clone()),
            selector: NextQuestionSelector::new(llm, config.clone()),
            store,
            config,
            locks,
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Processes one user message. A missing session id starts a new session.
    pub async fn process_turn(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::Validation("message must not be empty".into()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AppError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        let session_id = match session_id.map(str::trim) {
            Some("") => return Err(AppError::Validation("session_id must not be empty".into())),
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let _guard = self.locks.acquire(&session_id).await;
        let result = self.run_turn(&session_id, message).await;
        if let Err(e) = &result {
            self.metrics.record_collaborator_error();
            tracing::error!("Turn for session {} aborted: {}", session_id, e);
        }
        result
    }

    async fn run_turn(&self, session_id: &str, message: &str) -> Result<TurnOutcome> {
        let started = Instant::now();
        let mut stats = TurnStats::default();

        let context = self.assembler.assemble(session_id, message).await?;
        let turn = self
            .store
            .append_turn(session_id, ChatRole::User, message)
            .await?;
        let mut state = TurnState::Received;
        tracing::info!("Processing turn {} of session {}", turn.turn_number, session_id);

        let step = Instant::now();
        let outcome = self.extractor.extract(message, &context, &turn).await?;
        stats.extraction_ms = elapsed_ms(step);

        let candidates = match outcome {
            ExtractionOutcome::Captured(candidates) => {
                state.advance(TurnState::Extracted)?;
                candidates
            }
            ExtractionOutcome::Failed(failure) => {
                state.advance(TurnState::ExtractionFailed)?;
                self.record_reply(session_id, &failure.recovery_question).await;
                state.advance(TurnState::Composed)?;
                self.metrics.record_extraction_failure();
                tracing::info!(
                    "Turn {} of session {} captured nothing ({:?})",
                    turn.turn_number,
                    session_id,
                    failure.reason
                );
                return Ok(TurnOutcome::ExtractionFailed(ExtractionFailedResponse {
                    session_id: session_id.to_string(),
                    turn_number: turn.turn_number,
                    reason: failure.reason,
                    message: failure.message,
                    recovery_question: failure.recovery_question,
                }));
            }
        };
        stats.candidates = candidates.len();

        let step = Instant::now();
        let resolved = self.resolver.resolve(&context.graph, candidates).await?;
        stats.dedup_ms = elapsed_ms(step);
        state.advance(TurnState::Deduped)?;

        let batch = self.writer.build_batch(&context.graph, &turn, &resolved);
        let step = Instant::now();
        let written = self.write_with_retry(&batch).await;
        stats.graph_write_ms = elapsed_ms(step);

        if let Err(e) = written {
            state.advance(TurnState::GraphWriteFailed)?;
            tracing::error!(
                "Graph write for turn {} of session {} failed after retry: {}",
                turn.turn_number,
                session_id,
                e
            );
            self.record_reply(session_id, GRAPH_WRITE_FAILED_MESSAGE).await;
            state.advance(TurnState::Composed)?;
            self.metrics.record_graph_write_failure();
            return Ok(TurnOutcome::GraphWriteFailed(GraphWriteFailedResponse {
                session_id: session_id.to_string(),
                turn_number: turn.turn_number,
                message: GRAPH_WRITE_FAILED_MESSAGE.to_string(),
                retryable: true,
            }));
        }
        state.advance(TurnState::GraphWritten)?;

        let graph = self
            .store
            .snapshot(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;
        let touched: HashSet<String> = batch
            .nuggets
            .iter()
            .map(|n| n.id.clone())
            .chain(batch.nugget_revisions.iter().map(|r| r.nugget_id.clone()))
            .collect();

        let step = Instant::now();
        let plan = self.selector.select(&graph, &touched).await;
        stats.question_ms = elapsed_ms(step);
        state.advance(TurnState::QuestionSelected)?;

        let response = self.compose(session_id, turn.turn_number, &graph, &batch, &resolved, plan);
        let reply = response
            .next_question
            .as_ref()
            .map(|q| q.question.question.as_str())
            .unwrap_or(response.graph_update_summary.as_str());
        self.record_reply(session_id, reply).await;
        state.advance(TurnState::Composed)?;

        stats.nodes_created = batch.nodes.len();
        stats.edges_created = batch.edges.len();
        stats.merges = resolved.iter().filter(|r| !r.decision.creates_node()).count();
        stats.ambiguous = resolved.iter().filter(|r| r.decision.is_ambiguous()).count();
        stats.template_questions = response
            .next_question
            .iter()
            .map(|q| &q.question)
            .chain(response.alternate_paths.iter())
            .filter(|q| q.source == QuestionSource::Template)
            .count();
        stats.total_ms = elapsed_ms(started);
        self.metrics.record_captured(&stats);

        tracing::info!(
            session_id = %session_id,
            turn = turn.turn_number,
            candidates = stats.candidates,
            nodes_created = stats.nodes_created,
            merges = stats.merges,
            ambiguous = stats.ambiguous,
            edges_created = stats.edges_created,
            template_questions = stats.template_questions,
            extraction_ms = stats.extraction_ms,
            dedup_ms = stats.dedup_ms,
            graph_write_ms = stats.graph_write_ms,
            question_ms = stats.question_ms,
            total_ms = stats.total_ms,
            "pipeline_turn_metrics"
        );

        Ok(TurnOutcome::Captured(response))
    }

    async fn write_with_retry(&self, batch: &GraphWriteBatch) -> Result<()> {
        match self.writer.write(batch).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Graph write for batch {} failed, retrying: {}", batch.batch_id, e);
                tokio::time::sleep(self.config.retry_backoff()).await;
                self.writer.write(batch).await.map(|_| ())
            }
        }
    }

    /// Records the system reply; the turn outcome stands even if this fails
    async fn record_reply(&self, session_id: &str, content: &str) {
        if let Err(e) = self
            .store
            .append_turn(session_id, ChatRole::System, content)
            .await
        {
            tracing::warn!("Failed to record reply for session {}: {}", session_id, e);
        }
    }

    fn compose(
        &self,
        session_id: &str,
        turn_number: u64,
        graph: &SessionGraph,
        batch: &GraphWriteBatch,
        resolved: &[ResolvedCandidate],
        plan: Option<QuestionPlan>,
    ) -> TurnResponse {
        let mut captured: Vec<CapturedNugget> = Vec::new();
        let mut added_titles: Vec<String> = Vec::new();
        let mut linked_titles: Vec<String> = Vec::new();

        // one provenance record per candidate, in candidate order
        for (item, record) in resolved.iter().zip(batch.provenance.iter()) {
            let is_new = item.decision.creates_node();
            let node = graph.node(&record.node_id);
            let title = node
                .map(|n| n.title.clone())
                .unwrap_or_else(|| item.candidate.title.clone());

            if is_new {
                added_titles.push(title.clone());
            } else if !linked_titles.contains(&title) {
                linked_titles.push(title.clone());
            }

            if captured.iter().any(|c| c.node_id == record.node_id) {
                continue;
            }
            let nugget = graph.nugget_for_node(&record.node_id);
            captured.push(CapturedNugget {
                node_id: record.node_id.clone(),
                nugget_id: nugget.map(|n| n.id.clone()),
                title,
                node_type: node.map(|n| n.node_type).unwrap_or(item.candidate.node_type),
                score: nugget.map(|n| n.score).unwrap_or(item.candidate.score),
                is_new,
            });
        }
        captured.sort_by(|a, b| b.score.cmp(&a.score));
        captured.truncate(self.config.max_captured_nuggets);

        let merges = resolved.len() - added_titles.len();
        let (update_kind, graph_update_summary) =
            update_summary(&added_titles, merges, &linked_titles);

        let (next_question, alternate_paths) = match plan {
            Some(plan) => (
                Some(NextQuestion {
                    question: plan.primary,
                    why_this_next: plan.rationale,
                }),
                plan.alternates,
            ),
            None => (None, Vec::new()),
        };

        TurnResponse {
            session_id: session_id.to_string(),
            turn_number,
            captured_nuggets: captured,
            graph_update_summary,
            update_kind,
            next_question,
            alternate_paths,
            new_nodes: batch.nodes.iter().map(NodeView::from).collect(),
            new_edges: batch.edges.clone(),
        }
    }

    /// All nodes and edges of a session
    pub async fn graph_view(&self, session_id: &str) -> Result<GraphView> {
        let graph = self
            .store
            .snapshot(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;
        Ok(graph.view())
    }

    /// A node with its provenance and nugget
    pub async fn node_detail(&self, node_id: &str) -> Result<NodeDetail> {
        self.store
            .node_detail(node_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Node not found: {}", node_id)))
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

fn quoted(titles: &[String]) -> String {
    titles
        .iter()
        .map(|t| format!("\"{}\"", t))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human-readable summary of a turn's graph changes
pub fn update_summary(
    added: &[String],
    merges: usize,
    linked: &[String],
) -> (UpdateKind, String) {
    match (added.is_empty(), merges == 0) {
        (false, true) => (
            UpdateKind::Addition,
            format!(
                "Added {} to your knowledge graph: {}.",
                plural(added.len(), "new node"),
                quoted(added)
            ),
        ),
        (true, _) => (
            UpdateKind::Link,
            format!(
                "Linked {} to existing {}: {}.",
                plural(merges, "new input"),
                if linked.len() == 1 { "node" } else { "nodes" },
                quoted(linked)
            ),
        ),
        (false, false) => (
            UpdateKind::Mixed,
            format!(
                "Added {} ({}) and linked {} to existing nodes ({}).",
                plural(added.len(), "new node"),
                quoted(added),
                plural(merges, "input"),
                quoted(linked)
            ),
        ),
    }
}
