// Shared fixtures for pipeline integration tests
//
// - FixtureLanguageModel: canned extraction responses keyed by message
// - FixtureEmbedding: forced vectors keyed by text, so similarity is exact
// - FlakyStore: in-memory store whose commits can fail part-way through

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sponge::config::PipelineConfig;
use sponge::error::{AppError, Result};
use sponge::index::EmbeddingModel;
use sponge::llm::{CandidateSummary, ExtractionRequest, LanguageModel};
use sponge::models::*;
use sponge::observability::PipelineMetrics;
use sponge::services::{SessionLocks, TurnOrchestrator};
use sponge::storage::{
    CommitReceipt, GraphStore, GraphWriteBatch, InMemoryGraphStore,
};

pub const DIM: usize = 8;

// ============ Language model ============

#[derive(Default)]
pub struct FixtureLanguageModel {
    extractions: Mutex<HashMap<String, String>>,
    pub extract_calls: AtomicUsize,
    pub extraction_down: AtomicBool,
    pub confirm_duplicates: AtomicBool,
    pub confirm_calls: AtomicUsize,
}

impl FixtureLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the raw response returned for `message`
    pub fn respond(&self, message: &str, candidates: Vec<Value>) {
        self.extractions.lock().insert(
            message.to_string(),
            json!({ "candidates": candidates }).to_string(),
        );
    }
}

#[async_trait]
impl LanguageModel for FixtureLanguageModel {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.extraction_down.load(Ordering::SeqCst) {
            return Err(AppError::Collaborator("extraction endpoint unavailable".into()));
        }
        Ok(self
            .extractions
            .lock()
            .get(&request.message)
            .cloned()
            .unwrap_or_else(|| json!({ "candidates": [] }).to_string()))
    }

    async fn confirm_duplicate(
        &self,
        _candidate: &CandidateSummary,
        _existing: &Node,
    ) -> Result<bool> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirm_duplicates.load(Ordering::SeqCst))
    }

    async fn generate_question(&self, nugget: &Nugget, gap: GapType) -> Result<String> {
        Ok(format!("What {} would make \"{}\" land?", gap.as_str(), nugget.title))
    }
}

/// One extraction candidate with every dimension set to `score`
pub fn candidate(node_type: &str, title: &str, summary: &str, score: u8, gaps: &[&str]) -> Value {
    json!({
        "type": node_type,
        "title": title,
        "summary": summary,
        "key_phrases": [],
        "confidence": "high",
        "dimension_scores": {
            "specificity": score, "novelty": score, "authority": score,
            "actionability": score, "story_energy": score, "audience_resonance": score
        },
        "missing_fields": gaps
    })
}

// ============ Embedding ============

#[derive(Default)]
pub struct FixtureEmbedding {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
}

impl FixtureEmbedding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the vector used for a candidate with this title and summary
    pub fn pin(&self, title: &str, summary: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .insert(format!("{}\n{}", title, summary), vector);
    }
}

/// Unit vector along `axis`
pub fn axis(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

/// Unit vector whose cosine similarity with `axis(0)` is exactly `s`
pub fn at_similarity(s: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = s;
    v[1] = (1.0 - s * s).sqrt();
    v
}

#[async_trait]
impl EmbeddingModel for FixtureEmbedding {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .lock()
            .get(text)
            .cloned()
            .unwrap_or_else(|| axis(DIM - 1)))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

// ============ Store ============

/// Delegates to the in-memory store; failing commits carry a dangling edge so
/// the transaction aborts after part of the batch has been applied.
pub struct FlakyStore {
    inner: InMemoryGraphStore,
    pub failures_left: AtomicUsize,
    pub commit_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryGraphStore::new(),
            failures_left: AtomicUsize::new(failures),
            commit_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    async fn get_or_create_session(&self, session_id: &str) -> Result<(Session, bool)> {
        self.inner.get_or_create_session(session_id).await
    }

    async fn append_turn(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatTurn> {
        self.inner.append_turn(session_id, role, content).await
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<Arc<SessionGraph>>> {
        self.inner.snapshot(session_id).await
    }

    async fn commit(&self, batch: &GraphWriteBatch) -> Result<CommitReceipt> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !fail {
            return self.inner.commit(batch).await;
        }

        let mut broken = batch.clone();
        let anchor = batch
            .nodes
            .first()
            .map(|n| n.id.clone())
            .unwrap_or_default();
        broken.edges.push(Edge {
            id: "dangling".into(),
            session_id: batch.session_id.clone(),
            source_id: anchor,
            target_id: "missing-node".into(),
            edge_type: EdgeType::RelatedTo,
            created_at: Utc::now(),
        });
        self.inner.commit(&broken).await
    }

    async fn node_session(&self, node_id: &str) -> Result<Option<String>> {
        self.inner.node_session(node_id).await
    }

    async fn nugget_session(&self, nugget_id: &str) -> Result<Option<String>> {
        self.inner.nugget_session(nugget_id).await
    }

    async fn update_nugget(&self, nugget: &Nugget) -> Result<()> {
        self.inner.update_nugget(nugget).await
    }
}

// ============ Wiring ============

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_ms: 0,
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub store: Arc<dyn GraphStore>,
    pub llm: Arc<FixtureLanguageModel>,
    pub embedding: Arc<FixtureEmbedding>,
    pub orchestrator: TurnOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryGraphStore::new()))
    }

    pub fn with_store(store: Arc<dyn GraphStore>) -> Self {
        let llm = Arc::new(FixtureLanguageModel::new());
        let embedding = Arc::new(FixtureEmbedding::new());
        let orchestrator = TurnOrchestrator::new(
            store.clone(),
            llm.clone(),
            embedding.clone(),
            test_config(),
            SessionLocks::new(),
            Arc::new(PipelineMetrics::default()),
        );
        Self {
            store,
            llm,
            embedding,
            orchestrator,
        }
    }

    pub async fn graph(&self, session_id: &str) -> Arc<SessionGraph> {
        self.store
            .snapshot(session_id)
            .await
            .unwrap()
            .expect("session exists")
    }
}
