//! SurrealDB 图存储
//!
//! 每种实体一张表，行结构为 `{ session_id, seq, data }`，`data` 是模型的 JSON 表示。
//! 一个批次对应一条 `BEGIN/COMMIT TRANSACTION` 查询。

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashSet;
use std::sync::Arc;
use surrealdb::{
    Surreal,
    engine::any::{Any, connect},
    opt::auth::Root,
};

use crate::config::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::models::{
    ChatRole, ChatTurn, Edge, Node, Nugget, Provenance, Session, SessionGraph,
};
use crate::storage::batch::{CommitReceipt, GraphWriteBatch};
use crate::storage::repository::GraphStore;

/// SurrealDB 连接池
#[derive(Clone)]
pub struct SurrealPool {
    /// 数据库连接，clone 共享同一底层连接
    db: Surreal<Any>,
}

impl SurrealPool {
    /// 创建新的连接池
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db: Surreal<Any> = connect(&config.url).await?;

        // 内嵌引擎（mem://、rocksdb://）不需要认证
        if config.url.starts_with("ws") || config.url.starts_with("http") {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await?;
        }

        // 选择命名空间和数据库
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        tracing::info!("Connected to SurrealDB at {}", config.url);
        Ok(Self { db })
    }

    /// 获取内部数据库实例
    pub fn inner(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Row<T> {
    session_id: String,
    seq: u64,
    data: T,
}

#[derive(Debug, Deserialize)]
struct BatchRow {
    batch_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionRef {
    session_id: String,
}

/// SurrealDB 图存储
#[derive(Clone)]
pub struct SurrealGraphStore {
    pool: SurrealPool,
}

impl SurrealGraphStore {
    pub fn new(pool: SurrealPool) -> Self {
        Self { pool }
    }

    fn rows<T>(session_id: &str, start: usize, items: &[T]) -> Vec<Row<T>>
    where
        T: Clone,
    {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| Row {
                session_id: session_id.to_string(),
                seq: (start + i) as u64,
                data: item.clone(),
            })
            .collect()
    }

    async fn owner(&self, table: &str, id: &str) -> Result<Option<String>> {
        let db = self.pool.inner();
        let rows: Vec<SessionRef> = db
            .query("SELECT session_id FROM type::thing($table, $id)")
            .bind(("table", table.to_string()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        Ok(rows.into_iter().next().map(|r| r.session_id))
    }
}

fn take_data<T: DeserializeOwned>(
    response: &mut surrealdb::Response,
    index: usize,
) -> Result<Vec<T>> {
    let rows: Vec<Row<T>> = response.take(index)?;
    Ok(rows.into_iter().map(|r| r.data).collect())
}

/// 所有表在同一个事务里读取，commit 不会插在两次 SELECT 之间
const SNAPSHOT_QUERY: &str = r#"
BEGIN TRANSACTION;
SELECT * FROM session WHERE session_id = $session_id;
SELECT * FROM chat_turn WHERE session_id = $session_id ORDER BY seq ASC;
SELECT * FROM node WHERE session_id = $session_id ORDER BY seq ASC;
SELECT * FROM edge WHERE session_id = $session_id ORDER BY seq ASC;
SELECT * FROM nugget WHERE session_id = $session_id ORDER BY seq ASC;
SELECT * FROM provenance WHERE session_id = $session_id ORDER BY seq ASC;
SELECT batch_id FROM graph_batch WHERE session_id = $session_id;
COMMIT TRANSACTION;
"#;

const COMMIT_QUERY: &str = r#"
BEGIN TRANSACTION;
CREATE type::thing('graph_batch', $batch_id) CONTENT { session_id: $session_id, batch_id: $batch_id };
FOR $row IN $nodes { CREATE type::thing('node', $row.data.id) CONTENT $row; };
FOR $row IN $provenance { CREATE type::thing('provenance', $row.data.id) CONTENT $row; };
FOR $row IN $nuggets { CREATE type::thing('nugget', $row.data.id) CONTENT $row; };
FOR $row IN $edges { CREATE type::thing('edge', $row.data.id) CONTENT $row; };
FOR $rev IN $revisions {
    UPDATE type::thing('nugget', $rev.nugget_id)
        SET data.score = $rev.score,
            data.missing_fields = $rev.missing_fields,
            data.feedback_boost = $rev.feedback_boost;
};
FOR $refresh IN $refreshes {
    UPDATE type::thing('node', $refresh.node_id) SET data.embedding = $refresh.embedding;
};
COMMIT TRANSACTION;
"#;

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn get_or_create_session(&self, session_id: &str) -> Result<(Session, bool)> {
        let db = self.pool.inner();
        let existing: Option<Row<Session>> = db.select(("session", session_id)).await?;
        if let Some(row) = existing {
            return Ok((row.data, false));
        }

        let session = Session::with_id(session_id);
        let row = Row {
            session_id: session_id.to_string(),
            seq: 0,
            data: session.clone(),
        };
        let created: Result<Option<Row<Session>>> = db
            .create(("session", session_id))
            .content(row)
            .await
            .map_err(AppError::from);

        match created {
            Ok(_) => {
                tracing::info!("Created session: {}", session_id);
                Ok((session, true))
            }
            Err(e) => {
                // 并发首轮：另一个调用已经创建了同 ID 的会话
                let existing: Option<Row<Session>> = db.select(("session", session_id)).await?;
                existing.map(|row| (row.data, false)).ok_or(e)
            }
        }
    }

    async fn append_turn(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatTurn> {
        let db = self.pool.inner();
        let counts: Vec<serde_json::Value> = db
            .query("SELECT count() FROM chat_turn WHERE session_id = $session_id GROUP ALL")
            .bind(("session_id", session_id.to_string()))
            .await?
            .take(0)?;
        let count = counts
            .first()
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let turn = ChatTurn::new(session_id, count + 1, role, content);
        let row = Row {
            session_id: session_id.to_string(),
            seq: count,
            data: turn.clone(),
        };
        let _: Option<Row<ChatTurn>> = db.create(("chat_turn", turn.id.as_str())).content(row).await?;
        Ok(turn)
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<Arc<SessionGraph>>> {
        let mut response = self
            .pool
            .inner()
            .query(SNAPSHOT_QUERY)
            .bind(("session_id", session_id.to_string()))
            .await?;

        let sessions: Vec<Session> = take_data(&mut response, 0)?;
        let Some(session) = sessions.into_iter().next() else {
            return Ok(None);
        };
        let turns: Vec<ChatTurn> = take_data(&mut response, 1)?;
        let nodes: Vec<Node> = take_data(&mut response, 2)?;
        let edges: Vec<Edge> = take_data(&mut response, 3)?;
        let nuggets: Vec<Nugget> = take_data(&mut response, 4)?;
        let provenance: Vec<Provenance> = take_data(&mut response, 5)?;
        let batches: Vec<BatchRow> = response.take(6)?;

        Ok(Some(Arc::new(SessionGraph::from_parts(
            session,
            turns,
            nodes,
            edges,
            nuggets,
            provenance,
            batches.into_iter().map(|b| b.batch_id).collect::<HashSet<_>>(),
        ))))
    }

    async fn commit(&self, batch: &GraphWriteBatch) -> Result<CommitReceipt> {
        let base = self
            .snapshot(&batch.session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", batch.session_id)))?;
        if base.applied_batches.contains(&batch.batch_id) {
            return Ok(CommitReceipt::AlreadyApplied);
        }

        // 完整性检查在内存副本上执行，通过后才发出事务
        let mut staged = (*base).clone();
        batch.apply_to(&mut staged)?;

        let session_id = batch.session_id.as_str();
        let db = self.pool.inner();
        let response = db
            .query(COMMIT_QUERY)
            .bind(("batch_id", batch.batch_id.clone()))
            .bind(("session_id", session_id.to_string()))
            .bind(("nodes", Self::rows(session_id, base.nodes.len(), &batch.nodes)))
            .bind((
                "provenance",
                Self::rows(session_id, base.provenance.len(), &batch.provenance),
            ))
            .bind(("nuggets", Self::rows(session_id, base.nuggets.len(), &batch.nuggets)))
            .bind(("edges", Self::rows(session_id, base.edges.len(), &batch.edges)))
            .bind(("revisions", batch.nugget_revisions.clone()))
            .bind(("refreshes", batch.embedding_refreshes.clone()))
            .await
            .map_err(|e| AppError::GraphWrite(e.to_string()))?;
        response
            .check()
            .map_err(|e| AppError::GraphWrite(e.to_string()))?;

        Ok(CommitReceipt::Applied)
    }

    async fn node_session(&self, node_id: &str) -> Result<Option<String>> {
        self.owner("node", node_id).await
    }

    async fn nugget_session(&self, nugget_id: &str) -> Result<Option<String>> {
        self.owner("nugget", nugget_id).await
    }

    async fn update_nugget(&self, nugget: &Nugget) -> Result<()> {
        let db = self.pool.inner();
        let updated: Vec<Row<Nugget>> = db
            .query("UPDATE type::thing('nugget', $id) SET data = $data RETURN AFTER")
            .bind(("id", nugget.id.clone()))
            .bind(("data", nugget.clone()))
            .await?
            .take(0)?;
        if updated.is_empty() {
            return Err(AppError::NotFound(format!("Nugget not found: {}", nugget.id)));
        }
        Ok(())
    }
}
