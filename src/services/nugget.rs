//! Nugget 服务
//!
//! 列表查询、用户反馈和状态管理。所有修改都在会话锁内完成，与该会话的轮次互斥。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Nugget, NuggetStatus, NuggetType, UserFeedback};
use crate::services::locks::SessionLocks;
use crate::storage::GraphStore;

/// 点赞加分上限
pub const UPVOTE_SCORE_BOOST: u8 = 5;

/// 排序字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NuggetSort {
    /// 得分降序
    #[default]
    Score,
    /// 创建时间降序
    CreatedAt,
}

/// Nugget 列表查询参数
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NuggetQuery {
    /// 类型过滤
    pub nugget_type: Option<NuggetType>,
    /// 状态过滤
    pub status: Option<NuggetStatus>,
    /// 排序字段
    pub sort_by: NuggetSort,
}

/// 反馈结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedbackReceipt {
    pub nugget_id: String,
    pub user_feedback: UserFeedback,
    pub score: u8,
    pub message: String,
}

/// 状态变更结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReceipt {
    pub nugget_id: String,
    pub status: NuggetStatus,
    pub message: String,
}

/// Nugget 服务 trait
#[async_trait]
pub trait NuggetService: Send + Sync {
    /// 列出会话的 nugget
    async fn list(&self, session_id: &str, query: NuggetQuery) -> Result<Vec<Nugget>>;

    /// 提交点赞/点踩
    async fn set_feedback(&self, nugget_id: &str, feedback: UserFeedback)
    -> Result<FeedbackReceipt>;

    /// 修改状态
    async fn set_status(&self, nugget_id: &str, status: NuggetStatus) -> Result<StatusReceipt>;
}

/// 应用反馈并调整得分
///
/// 点赞只加一次分，记录实际加了多少；改为点踩时把这部分扣回。
pub fn apply_feedback(nugget: &mut Nugget, feedback: UserFeedback) {
    let previous = nugget.user_feedback;
    match feedback {
        UserFeedback::Up => {
            if previous != Some(UserFeedback::Up) {
                let boost = UPVOTE_SCORE_BOOST.min(100u8.saturating_sub(nugget.score));
                nugget.score += boost;
                nugget.feedback_boost = boost;
            }
        }
        UserFeedback::Down => {
            nugget.score = nugget.score.saturating_sub(nugget.feedback_boost);
            nugget.feedback_boost = 0;
        }
    }
    nugget.user_feedback = Some(feedback);
}

/// Nugget 服务实现
pub struct NuggetServiceImpl {
    store: Arc<dyn GraphStore>,
    locks: SessionLocks,
}

impl NuggetServiceImpl {
    /// 创建新的服务实例
    pub fn new(store: Arc<dyn GraphStore>, locks: SessionLocks) -> Self {
        Self { store, locks }
    }

    async fn session_of(&self, nugget_id: &str) -> Result<String> {
        self.store
            .nugget_session(nugget_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Nugget not found: {}", nugget_id)))
    }

    async fn load(&self, nugget_id: &str) -> Result<Nugget> {
        self.store
            .find_nugget(nugget_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Nugget not found: {}", nugget_id)))
    }
}

#[async_trait]
impl NuggetService for NuggetServiceImpl {
    async fn list(&self, session_id: &str, query: NuggetQuery) -> Result<Vec<Nugget>> {
        let graph = self
            .store
            .snapshot(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;

        let mut nuggets: Vec<Nugget> = graph
            .nuggets
            .iter()
            .filter(|n| query.nugget_type.is_none_or(|t| n.nugget_type == t))
            .filter(|n| query.status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();

        match query.sort_by {
            NuggetSort::Score => nuggets.sort_by_key(|n| Reverse(n.score)),
            NuggetSort::CreatedAt => nuggets.sort_by_key(|n| Reverse(n.created_at)),
        }
        Ok(nuggets)
    }

    async fn set_feedback(
        &self,
        nugget_id: &str,
        feedback: UserFeedback,
    ) -> Result<FeedbackReceipt> {
        let session_id = self.session_of(nugget_id).await?;
        let _guard = self.locks.acquire(&session_id).await;

        let mut nugget = self.load(nugget_id).await?;
        apply_feedback(&mut nugget, feedback);
        self.store.update_nugget(&nugget).await?;

        tracing::info!(
            "Nugget {} feedback set to {:?}, score now {}",
            nugget_id,
            feedback,
            nugget.score
        );

        let message = match feedback {
            UserFeedback::Up => "Nugget approved. It will be prioritized in future suggestions.",
            UserFeedback::Down => "Nugget rejected. It will be excluded from future suggestions.",
        };
        Ok(FeedbackReceipt {
            nugget_id: nugget.id,
            user_feedback: feedback,
            score: nugget.score,
            message: message.to_string(),
        })
    }

    async fn set_status(&self, nugget_id: &str, status: NuggetStatus) -> Result<StatusReceipt> {
        let session_id = self.session_of(nugget_id).await?;
        let _guard = self.locks.acquire(&session_id).await;

        let mut nugget = self.load(nugget_id).await?;
        let previous = nugget.status;
        nugget.status = status;
        self.store.update_nugget(&nugget).await?;

        tracing::info!("Nugget {} status {:?} -> {:?}", nugget_id, previous, status);

        Ok(StatusReceipt {
            nugget_id: nugget.id,
            status,
            message: format!(
                "Nugget status changed from '{}' to '{}'.",
                status_name(previous),
                status_name(status)
            ),
        })
    }
}

fn status_name(status: NuggetStatus) -> &'static str {
    match status {
        NuggetStatus::New => "new",
        NuggetStatus::Explored => "explored",
        NuggetStatus::Parked => "parked",
    }
}

/// 创建 Nugget 服务
pub fn create_nugget_service(
    store: Arc<dyn GraphStore>,
    locks: SessionLocks,
) -> Arc<dyn NuggetService> {
    Arc::new(NuggetServiceImpl::new(store, locks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::storage::{GraphWriteBatch, InMemoryGraphStore};
    use chrono::{Duration, Utc};
    use rstest::rstest;

    fn bare_nugget(score: u8) -> Nugget {
        Nugget {
            id: "n".into(),
            node_id: "node".into(),
            session_id: "s1".into(),
            nugget_type: NuggetType::Idea,
            title: "Title".into(),
            summary: "Summary".into(),
            score,
            dimension_scores: DimensionScores::default(),
            missing_fields: vec![],
            status: NuggetStatus::New,
            user_feedback: None,
            feedback_boost: 0,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(60, &[UserFeedback::Up], 65)]
    #[case(60, &[UserFeedback::Up, UserFeedback::Up], 65)]
    #[case(60, &[UserFeedback::Up, UserFeedback::Down], 60)]
    #[case(60, &[UserFeedback::Down], 60)]
    #[case(98, &[UserFeedback::Up], 100)]
    #[case(98, &[UserFeedback::Up, UserFeedback::Down], 98)]
    #[case(60, &[UserFeedback::Up, UserFeedback::Down, UserFeedback::Up], 65)]
    fn test_feedback_arithmetic(
        #[case] start: u8,
        #[case] steps: &[UserFeedback],
        #[case] expected: u8,
    ) {
        let mut nugget = bare_nugget(start);
        for step in steps {
            apply_feedback(&mut nugget, *step);
        }
        assert_eq!(nugget.score, expected);
    }

    async fn seeded_store() -> Arc<dyn GraphStore> {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        store.get_or_create_session("s1").await.unwrap();

        let mut batch = GraphWriteBatch {
            batch_id: "b1".into(),
            session_id: "s1".into(),
            ..Default::default()
        };
        for (i, (node_type, score)) in [
            (NodeType::Idea, 40u8),
            (NodeType::Story, 80),
            (NodeType::Idea, 60),
        ]
        .into_iter()
        .enumerate()
        {
            let created_at = Utc::now() + Duration::seconds(i as i64);
            let node_id = format!("node{}", i);
            batch.nodes.push(Node {
                id: node_id.clone(),
                session_id: "s1".into(),
                node_type,
                title: format!("Title {}", i),
                summary: "Summary".into(),
                embedding: vec![1.0],
                created_at,
            });
            batch.provenance.push(Provenance {
                id: format!("p{}", i),
                node_id: node_id.clone(),
                session_id: "s1".into(),
                source_kind: SourceKind::Chat,
                source_id: "t1".into(),
                confidence: Confidence::High,
                created_at,
            });
            let mut nugget = bare_nugget(score);
            nugget.id = format!("n{}", i);
            nugget.node_id = node_id;
            nugget.nugget_type = node_type.nugget_type().unwrap();
            nugget.created_at = created_at;
            batch.nuggets.push(nugget);
        }
        store.commit(&batch).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let service = create_nugget_service(seeded_store().await, SessionLocks::new());

        let by_score = service.list("s1", NuggetQuery::default()).await.unwrap();
        let scores: Vec<u8> = by_score.iter().map(|n| n.score).collect();
        assert_eq!(scores, vec![80, 60, 40]);

        let newest_ideas = service
            .list(
                "s1",
                NuggetQuery {
                    nugget_type: Some(NuggetType::Idea),
                    sort_by: NuggetSort::CreatedAt,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<&str> = newest_ideas.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n0"]);

        assert!(matches!(
            service.list("missing", NuggetQuery::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_feedback_and_status_persist() {
        let store = seeded_store().await;
        let service = create_nugget_service(store.clone(), SessionLocks::new());

        let receipt = service.set_feedback("n0", UserFeedback::Up).await.unwrap();
        assert_eq!(receipt.score, 45);
        let receipt = service.set_status("n0", NuggetStatus::Parked).await.unwrap();
        assert_eq!(receipt.message, "Nugget status changed from 'new' to 'parked'.");

        let stored = store.find_nugget("n0").await.unwrap().unwrap();
        assert_eq!(stored.score, 45);
        assert_eq!(stored.status, NuggetStatus::Parked);
        assert!(!stored.is_eligible());

        let parked = service
            .list(
                "s1",
                NuggetQuery {
                    status: Some(NuggetStatus::Parked),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(parked.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_nugget_is_not_found() {
        let service = create_nugget_service(seeded_store().await, SessionLocks::new());
        assert!(matches!(
            service.set_feedback("nope", UserFeedback::Down).await,
            Err(AppError::NotFound(_))
        ));
    }
}
