//! 进程内图存储
//!
//! 每个会话保存为一个 `Arc<SessionGraph>`。写入在克隆上完成再整体替换指针，
//! 读取方拿到的快照不会被后续写入修改，也不需要等待写入完成。

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{ChatRole, ChatTurn, Nugget, Session, SessionGraph};
use crate::storage::batch::{CommitReceipt, GraphWriteBatch};
use crate::storage::repository::GraphStore;

#[derive(Default)]
struct StoreState {
    sessions: HashMap<String, Arc<SessionGraph>>,
    node_sessions: HashMap<String, String>,
    nugget_sessions: HashMap<String, String>,
}

/// 内存图存储
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<StoreState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, session_id: &str) -> Result<Arc<SessionGraph>> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))
    }

    /// 用 `base` 为基准替换会话快照；期间快照被其他写入替换则失败
    fn swap(
        &self,
        base: &Arc<SessionGraph>,
        next: SessionGraph,
        index: impl FnOnce(&mut StoreState),
    ) -> Result<()> {
        let mut state = self.state.write();
        let session_id = next.session_id().to_string();
        match state.sessions.get(&session_id) {
            Some(stored) if Arc::ptr_eq(stored, base) => {}
            _ => {
                return Err(AppError::GraphWrite(format!(
                    "session {} was modified concurrently",
                    session_id
                )));
            }
        }
        state.sessions.insert(session_id, Arc::new(next));
        index(&mut state);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_or_create_session(&self, session_id: &str) -> Result<(Session, bool)> {
        if let Some(graph) = self.state.read().sessions.get(session_id) {
            return Ok((graph.session.clone(), false));
        }

        let mut state = self.state.write();
        // 拿到写锁后再检查一次，并发的首轮调用只会创建一个会话
        if let Some(graph) = state.sessions.get(session_id) {
            return Ok((graph.session.clone(), false));
        }
        let session = Session::with_id(session_id);
        state.sessions.insert(
            session_id.to_string(),
            Arc::new(SessionGraph::new(session.clone())),
        );
        tracing::info!("Created session: {}", session_id);
        Ok((session, true))
    }

    async fn append_turn(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatTurn> {
        let mut state = self.state.write();
        let graph = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;
        let graph = Arc::make_mut(graph);
        let turn = ChatTurn::new(session_id, graph.next_turn_number(), role, content);
        graph.turns.push(turn.clone());
        Ok(turn)
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<Arc<SessionGraph>>> {
        Ok(self.state.read().sessions.get(session_id).cloned())
    }

    async fn commit(&self, batch: &GraphWriteBatch) -> Result<CommitReceipt> {
        let base = self.current(&batch.session_id)?;
        if base.applied_batches.contains(&batch.batch_id) {
            tracing::debug!("Batch {} already applied", batch.batch_id);
            return Ok(CommitReceipt::AlreadyApplied);
        }

        let mut next = (*base).clone();
        batch.apply_to(&mut next)?;

        self.swap(&base, next, |state| {
            for node in &batch.nodes {
                state
                    .node_sessions
                    .insert(node.id.clone(), batch.session_id.clone());
            }
            for nugget in &batch.nuggets {
                state
                    .nugget_sessions
                    .insert(nugget.id.clone(), batch.session_id.clone());
            }
        })?;

        tracing::debug!(
            "Committed batch {}: {} nodes, {} edges, {} nuggets",
            batch.batch_id,
            batch.nodes.len(),
            batch.edges.len(),
            batch.nuggets.len()
        );
        Ok(CommitReceipt::Applied)
    }

    async fn node_session(&self, node_id: &str) -> Result<Option<String>> {
        Ok(self.state.read().node_sessions.get(node_id).cloned())
    }

    async fn nugget_session(&self, nugget_id: &str) -> Result<Option<String>> {
        Ok(self.state.read().nugget_sessions.get(nugget_id).cloned())
    }

    async fn update_nugget(&self, nugget: &Nugget) -> Result<()> {
        let base = self.current(&nugget.session_id)?;
        let mut next = (*base).clone();
        let slot = next
            .nuggets
            .iter_mut()
            .find(|n| n.id == nugget.id)
            .ok_or_else(|| AppError::NotFound(format!("Nugget not found: {}", nugget.id)))?;
        *slot = nugget.clone();
        self.swap(&base, next, |_| {})
    }
}
