use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::index::cosine_similarity;
use crate::models::{ChatRole, ChatTurn, Node, NodeDetail, Nugget, Session, SessionGraph};
use crate::storage::batch::{CommitReceipt, GraphWriteBatch};

/// 带相似度的节点
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: Node,
    pub similarity: f32,
}

/// 图存储 trait
///
/// 会话、轮次、节点、边、nugget 和来源记录的持久化。读取走一致性快照，写入是
/// 多行事务。
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// 获取会话，不存在时创建（幂等）。返回值的第二项表示本次是否新建
    async fn get_or_create_session(&self, session_id: &str) -> Result<(Session, bool)>;

    /// 追加一条对话轮次，序号在会话内单调递增
    async fn append_turn(&self, session_id: &str, role: ChatRole, content: &str)
    -> Result<ChatTurn>;

    /// 会话的一致性快照
    async fn snapshot(&self, session_id: &str) -> Result<Option<Arc<SessionGraph>>>;

    /// 原子提交一个批次
    async fn commit(&self, batch: &GraphWriteBatch) -> Result<CommitReceipt>;

    /// 节点所属会话
    async fn node_session(&self, node_id: &str) -> Result<Option<String>>;

    /// nugget 所属会话
    async fn nugget_session(&self, nugget_id: &str) -> Result<Option<String>>;

    /// 更新 nugget 的用户可编辑字段（反馈、状态、得分）
    async fn update_nugget(&self, nugget: &Nugget) -> Result<()>;

    /// 节点详情
    async fn node_detail(&self, node_id: &str) -> Result<Option<NodeDetail>> {
        let Some(session_id) = self.node_session(node_id).await? else {
            return Ok(None);
        };
        Ok(self
            .snapshot(&session_id)
            .await?
            .and_then(|graph| NodeDetail::from_graph(&graph, node_id)))
    }

    /// 按 ID 查找 nugget
    async fn find_nugget(&self, nugget_id: &str) -> Result<Option<Nugget>> {
        let Some(session_id) = self.nugget_session(nugget_id).await? else {
            return Ok(None);
        };
        Ok(self
            .snapshot(&session_id)
            .await?
            .and_then(|graph| graph.nugget(nugget_id).cloned()))
    }
}

/// 相似度降序；相同时较新创建的节点在前
pub fn rank_by_similarity(graph: &SessionGraph, embedding: &[f32], limit: usize) -> Vec<ScoredNode> {
    let mut scored: Vec<(usize, ScoredNode)> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(rank, node)| {
            (
                rank,
                ScoredNode {
                    similarity: cosine_similarity(embedding, &node.embedding),
                    node: node.clone(),
                },
            )
        })
        .collect();

    scored.sort_by(|(rank_a, a), (rank_b, b)| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.node.created_at.cmp(&a.node.created_at))
            .then_with(|| rank_b.cmp(rank_a))
    });
    scored.truncate(limit);
    scored.into_iter().map(|(_, s)| s).collect()
}
