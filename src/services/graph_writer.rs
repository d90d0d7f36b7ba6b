//! Graph Writer
//!
//! Turns a set of dedup decisions into one [`GraphWriteBatch`] and commits it.
//! Every id in the batch is derived from the candidate ids and the turn, so a
//! rebuilt or retried batch writes the same rows under the same ids; only the
//! `created_at` timestamps differ.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::index::normalized_mean;
use crate::models::{
    ChatTurn, Edge, EdgeType, GapType, Node, Nugget, NuggetStatus, Provenance, SessionGraph,
    SourceKind,
};
use crate::services::dedup::ResolvedCandidate;
use crate::storage::{CommitReceipt, EmbeddingRefresh, GraphStore, GraphWriteBatch, NuggetRevision};

const GRAPH_NAMESPACE: Uuid = Uuid::from_u128(0x1d4b_7e90_c3a2_4f6d_b815_02e7_9c4a_6f31);

fn derived_id(seed: &str) -> String {
    Uuid::new_v5(&GRAPH_NAMESPACE, seed.as_bytes()).to_string()
}

/// Batch id for a turn
pub fn batch_id_for(turn: &ChatTurn) -> String {
    derived_id(&format!("batch:{}", turn.id))
}

pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    config: PipelineConfig,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Builds the write for one turn. `graph` is the snapshot the decisions were made against.
    pub fn build_batch(
        &self,
        graph: &SessionGraph,
        turn: &ChatTurn,
        resolved: &[ResolvedCandidate],
    ) -> GraphWriteBatch {
        let now = Utc::now();
        let session_id = graph.session_id().to_string();
        let mut batch = GraphWriteBatch {
            batch_id: batch_id_for(turn),
            session_id: session_id.clone(),
            ..Default::default()
        };

        // (node id, score) of new nodes in candidate order
        let mut created: Vec<(String, u8)> = Vec::new();
        let mut revisions: Vec<NuggetRevision> = Vec::new();
        let mut refreshes: Vec<EmbeddingRefresh> = Vec::new();

        for item in resolved {
            let candidate = &item.candidate;
            let cid = &candidate.candidate_id;

            let node_id = match item.decision.merge_target() {
                Some(target_id) => {
                    batch.edges.push(Edge {
                        id: derived_id(&format!("{}/expands_on", cid)),
                        session_id: session_id.clone(),
                        source_id: target_id.to_string(),
                        target_id: target_id.to_string(),
                        edge_type: EdgeType::ExpandsOn,
                        created_at: now,
                    });
                    fold_revision(&mut revisions, graph, target_id, candidate.score, &candidate.missing_fields);
                    fold_refresh(&mut refreshes, graph, target_id, &item.embedding);
                    target_id.to_string()
                }
                None => {
                    let node_id = derived_id(&format!("{}/node", cid));
                    batch.nodes.push(Node {
                        id: node_id.clone(),
                        session_id: session_id.clone(),
                        node_type: candidate.node_type,
                        title: candidate.title.clone(),
                        summary: candidate.summary.clone(),
                        embedding: item.embedding.clone(),
                        created_at: now,
                    });
                    if let Some(nugget_type) = candidate.node_type.nugget_type() {
                        batch.nuggets.push(Nugget {
                            id: derived_id(&format!("{}/nugget", cid)),
                            node_id: node_id.clone(),
                            session_id: session_id.clone(),
                            nugget_type,
                            title: candidate.title.clone(),
                            summary: candidate.summary.clone(),
                            score: candidate.score,
                            dimension_scores: candidate.dimension_scores,
                            missing_fields: candidate.missing_fields.clone(),
                            status: NuggetStatus::New,
                            user_feedback: None,
                            feedback_boost: 0,
                            created_at: now,
                        });
                    }
                    created.push((node_id.clone(), candidate.score));
                    node_id
                }
            };

            batch.provenance.push(Provenance {
                id: derived_id(&format!("{}/provenance", cid)),
                node_id,
                session_id: session_id.clone(),
                source_kind: SourceKind::Chat,
                source_id: turn.id.clone(),
                confidence: candidate.confidence,
                created_at: now,
            });
        }

        batch.edges.extend(self.related_edges(&session_id, &created, now));
        batch.nugget_revisions = revisions;
        batch.embedding_refreshes = refreshes;
        batch
    }

    /// `related_to` edges among the turn's new nodes: pairwise up to the limit, hub-and-spoke beyond it
    fn related_edges(
        &self,
        session_id: &str,
        created: &[(String, u8)],
        now: chrono::DateTime<Utc>,
    ) -> Vec<Edge> {
        let edge = |source: &str, target: &str| Edge {
            id: derived_id(&format!("{}/{}/related_to", source, target)),
            session_id: session_id.to_string(),
            source_id: source.to_string(),
            target_id: target.to_string(),
            edge_type: EdgeType::RelatedTo,
            created_at: now,
        };

        if created.len() <= self.config.pairwise_edge_limit {
            let mut edges = Vec::new();
            for (i, (a, _)) in created.iter().enumerate() {
                for (b, _) in &created[i + 1..] {
                    edges.push(edge(a, b));
                }
            }
            return edges;
        }

        // first candidate wins ties
        let mut hub = 0;
        for (i, (_, score)) in created.iter().enumerate() {
            if *score > created[hub].1 {
                hub = i;
            }
        }
        let hub_id = &created[hub].0;
        created
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != hub)
            .map(|(_, (spoke, _))| edge(hub_id, spoke))
            .collect()
    }

    /// Commits the batch; anything that goes wrong is reported as a graph write failure
    pub async fn write(&self, batch: &GraphWriteBatch) -> Result<CommitReceipt> {
        match self.store.commit(batch).await {
            Ok(receipt) => {
                tracing::info!(
                    "Committed batch {}: {} nodes, {} edges, {} revisions ({:?})",
                    batch.batch_id,
                    batch.nodes.len(),
                    batch.edges.len(),
                    batch.nugget_revisions.len(),
                    receipt
                );
                Ok(receipt)
            }
            Err(e @ AppError::GraphWrite(_)) => Err(e),
            Err(e) => Err(AppError::GraphWrite(e.to_string())),
        }
    }
}

fn fold_revision(
    revisions: &mut Vec<NuggetRevision>,
    graph: &SessionGraph,
    node_id: &str,
    score: u8,
    gaps: &[GapType],
) {
    let Some(nugget) = graph.nugget_for_node(node_id) else {
        return;
    };

    let index = match revisions.iter().position(|r| r.nugget_id == nugget.id) {
        Some(i) => i,
        None => {
            revisions.push(NuggetRevision {
                nugget_id: nugget.id.clone(),
                score: nugget.score,
                missing_fields: nugget.missing_fields.clone(),
                feedback_boost: nugget.feedback_boost,
            });
            revisions.len() - 1
        }
    };

    let revision = &mut revisions[index];
    // a higher candidate score replaces the boosted one, so the boost is gone
    if score > revision.score {
        revision.score = score;
        revision.feedback_boost = 0;
    }
    revision.missing_fields.retain(|gap| gaps.contains(gap));
}

fn fold_refresh(
    refreshes: &mut Vec<EmbeddingRefresh>,
    graph: &SessionGraph,
    node_id: &str,
    embedding: &[f32],
) {
    if let Some(existing) = refreshes.iter_mut().find(|r| r.node_id == node_id) {
        existing.embedding = normalized_mean(&existing.embedding, embedding);
        return;
    }
    let Some(node) = graph.node(node_id) else {
        return;
    };
    refreshes.push(EmbeddingRefresh {
        node_id: node_id.to_string(),
        embedding: normalized_mean(&node.embedding, embedding),
    });
}
