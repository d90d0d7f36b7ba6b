//! 单轮图写入批次
//!
//! 一个批次就是一次事务的全部内容。存储后端在落盘前用 [`GraphWriteBatch::apply_to`]
//! 做完整性检查，任何一条违反都会让整个批次失败。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::models::{Edge, GapType, Node, Nugget, Provenance, SessionGraph};

/// 合并时对已有 nugget 的修订
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NuggetRevision {
    pub nugget_id: String,
    pub score: u8,
    pub missing_fields: Vec<GapType>,
    /// 修订后的得分中仍然包含的点赞加分
    #[serde(default)]
    pub feedback_boost: u8,
}

/// 合并时刷新节点 embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRefresh {
    pub node_id: String,
    pub embedding: Vec<f32>,
}

/// 图写入批次
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphWriteBatch {
    /// 批次ID，同一组决策重试时保持不变
    pub batch_id: String,
    pub session_id: String,
    pub nodes: Vec<Node>,
    pub nuggets: Vec<Nugget>,
    pub edges: Vec<Edge>,
    pub provenance: Vec<Provenance>,
    pub nugget_revisions: Vec<NuggetRevision>,
    pub embedding_refreshes: Vec<EmbeddingRefresh>,
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReceipt {
    Applied,
    /// 批次此前已提交，本次未做任何修改
    AlreadyApplied,
}

fn violation(message: String) -> AppError {
    AppError::GraphWrite(message)
}

impl GraphWriteBatch {
    /// 在快照上应用批次；失败时 `graph` 可能处于半修改状态，调用方应丢弃它
    pub fn apply_to(&self, graph: &mut SessionGraph) -> Result<()> {
        let session_id = graph.session_id().to_string();
        if self.session_id != session_id {
            return Err(violation(format!(
                "batch {} targets session {} but graph is {}",
                self.batch_id, self.session_id, session_id
            )));
        }

        let mut new_node_ids = HashSet::new();
        for node in &self.nodes {
            if node.session_id != session_id {
                return Err(violation(format!("node {} belongs to another session", node.id)));
            }
            if graph.contains_node(&node.id) || !new_node_ids.insert(node.id.as_str()) {
                return Err(violation(format!("node {} already exists", node.id)));
            }
        }
        for node in &self.nodes {
            if !self.provenance.iter().any(|p| p.node_id == node.id) {
                return Err(violation(format!("node {} has no provenance", node.id)));
            }
            graph.push_node(node.clone());
        }

        for record in &self.provenance {
            if record.session_id != session_id || !graph.contains_node(&record.node_id) {
                return Err(violation(format!(
                    "provenance {} references unknown node {}",
                    record.id, record.node_id
                )));
            }
            if graph.provenance.iter().any(|p| p.id == record.id) {
                return Err(violation(format!("provenance {} already exists", record.id)));
            }
            graph.provenance.push(record.clone());
        }

        for nugget in &self.nuggets {
            let node = graph.node(&nugget.node_id).ok_or_else(|| {
                violation(format!("nugget {} references unknown node", nugget.id))
            })?;
            if node.node_type.nugget_type() != Some(nugget.nugget_type) {
                return Err(violation(format!(
                    "node {} of type {} cannot carry a {:?} nugget",
                    node.id,
                    node.node_type.as_str(),
                    nugget.nugget_type
                )));
            }
            if nugget.session_id != session_id
                || graph.nugget_for_node(&nugget.node_id).is_some()
                || graph.nugget(&nugget.id).is_some()
            {
                return Err(violation(format!(
                    "node {} already has a nugget",
                    nugget.node_id
                )));
            }
            if nugget.score > 100 {
                return Err(violation(format!("nugget {} score out of range", nugget.id)));
            }
            graph.nuggets.push(nugget.clone());
        }

        for edge in &self.edges {
            if edge.session_id != session_id
                || !graph.contains_node(&edge.source_id)
                || !graph.contains_node(&edge.target_id)
            {
                return Err(violation(format!(
                    "edge {} endpoints must be nodes of session {}",
                    edge.id, session_id
                )));
            }
            if graph.edges.iter().any(|e| e.id == edge.id) {
                return Err(violation(format!("edge {} already exists", edge.id)));
            }
            graph.edges.push(edge.clone());
        }

        for revision in &self.nugget_revisions {
            if revision.score > 100 {
                return Err(violation(format!(
                    "revision for {} has score out of range",
                    revision.nugget_id
                )));
            }
            let nugget = graph
                .nuggets
                .iter_mut()
                .find(|n| n.id == revision.nugget_id)
                .ok_or_else(|| {
                    violation(format!("revision targets unknown nugget {}", revision.nugget_id))
                })?;
            nugget.score = revision.score;
            nugget.missing_fields = revision.missing_fields.clone();
            nugget.feedback_boost = revision.feedback_boost.min(revision.score);
        }

        for refresh in &self.embedding_refreshes {
            let node = graph.node_mut(&refresh.node_id).ok_or_else(|| {
                violation(format!("embedding refresh targets unknown node {}", refresh.node_id))
            })?;
            if !node.embedding.is_empty() && node.embedding.len() != refresh.embedding.len() {
                return Err(violation(format!(
                    "embedding refresh for {} changes dimension",
                    refresh.node_id
                )));
            }
            node.embedding = refresh.embedding.clone();
        }

        graph.applied_batches.insert(self.batch_id.clone());
        Ok(())
    }
}
