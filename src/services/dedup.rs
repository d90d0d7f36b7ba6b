//! Deduplication/Merge Resolver
//!
//! Each candidate is embedded and compared against the session's existing nodes.
//! Two thresholds split the similarity range into three zones; the middle zone
//! is settled by a confirmation call to the language model.

use serde::Serialize;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::index::EmbeddingModel;
use crate::llm::{CandidateSummary, LanguageModel, call_with_retry};
use crate::models::SessionGraph;
use crate::services::extraction::ScoredCandidate;
use crate::storage::repository::rank_by_similarity;

/// How an ambiguous-zone candidate ended up as a new node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// The model said the two are different
    Denied,
    /// The confirmation call failed; defaulted to create
    Failed,
}

/// Per-candidate decision
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DedupDecision {
    Create,
    Merge {
        target_id: String,
        similarity: f32,
    },
    AmbiguousCreate {
        target_id: String,
        similarity: f32,
        confirmation: ConfirmationOutcome,
    },
    AmbiguousMerge {
        target_id: String,
        similarity: f32,
    },
}

impl DedupDecision {
    /// Node the candidate merges into, if any
    pub fn merge_target(&self) -> Option<&str> {
        match self {
            DedupDecision::Merge { target_id, .. }
            | DedupDecision::AmbiguousMerge { target_id, .. } => Some(target_id),
            DedupDecision::Create | DedupDecision::AmbiguousCreate { .. } => None,
        }
    }

    pub fn creates_node(&self) -> bool {
        self.merge_target().is_none()
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            DedupDecision::AmbiguousCreate { .. } | DedupDecision::AmbiguousMerge { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCandidate {
    pub candidate: ScoredCandidate,
    pub embedding: Vec<f32>,
    pub decision: DedupDecision,
}

pub struct DedupResolver {
    llm: Arc<dyn LanguageModel>,
    embedding: Arc<dyn EmbeddingModel>,
    config: PipelineConfig,
}

impl DedupResolver {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedding: Arc<dyn EmbeddingModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            embedding,
            config,
        }
    }

    /// Resolves candidates against the nodes that existed before this turn.
    pub async fn resolve(
        &self,
        graph: &SessionGraph,
        candidates: Vec<ScoredCandidate>,
    ) -> Result<Vec<ResolvedCandidate>> {
        let mut resolved = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let text = candidate.embedding_text();
            let text = text.as_str();
            let embedding = call_with_retry(
                "embedding",
                self.config.embedding_timeout(),
                self.config.retry_backoff(),
                move || self.embedding.encode(text),
            )
            .await?;

            let decision = self.decide(graph, &candidate, &embedding).await;
            tracing::debug!("Candidate \"{}\" resolved to {:?}", candidate.title, decision);
            resolved.push(ResolvedCandidate {
                candidate,
                embedding,
                decision,
            });
        }

        Ok(resolved)
    }

    async fn decide(
        &self,
        graph: &SessionGraph,
        candidate: &ScoredCandidate,
        embedding: &[f32],
    ) -> DedupDecision {
        let Some(best) = rank_by_similarity(graph, embedding, 1).into_iter().next() else {
            return DedupDecision::Create;
        };

        let similarity = best.similarity;
        let target_id = best.node.id.clone();

        if similarity >= self.config.merge_threshold {
            return DedupDecision::Merge {
                target_id,
                similarity,
            };
        }
        if similarity < self.config.ambiguous_threshold {
            return DedupDecision::Create;
        }

        let summary = CandidateSummary {
            node_type: candidate.node_type,
            title: candidate.title.clone(),
            summary: candidate.summary.clone(),
        };
        let summary = &summary;
        let existing = &best.node;
        let confirmed = call_with_retry(
            "dedup_confirmation",
            self.config.confirmation_timeout(),
            self.config.retry_backoff(),
            move || self.llm.confirm_duplicate(summary, existing),
        )
        .await;

        match confirmed {
            Ok(true) => DedupDecision::AmbiguousMerge {
                target_id,
                similarity,
            },
            Ok(false) => DedupDecision::AmbiguousCreate {
                target_id,
                similarity,
                confirmation: ConfirmationOutcome::Denied,
            },
            Err(e) => {
                tracing::warn!(
                    "Dedup confirmation failed for \"{}\", defaulting to create: {}",
                    candidate.title,
                    e
                );
                DedupDecision::AmbiguousCreate {
                    target_id,
                    similarity,
                    confirmation: ConfirmationOutcome::Failed,
                }
            }
        }
    }
}
