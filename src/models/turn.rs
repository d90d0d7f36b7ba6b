use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// 消息角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// 用户消息
    User,
    /// 系统回复
    System,
}

/// 对话轮次实体
///
/// 写入后不可变。`turn_number` 在会话内单调递增。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    /// 轮次唯一标识
    pub id: String,

    /// 所属会话ID
    pub session_id: String,

    /// 轮次序号
    pub turn_number: u64,

    /// 消息角色
    pub role: ChatRole,

    /// 消息内容
    pub content: String,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// 创建新轮次
    pub fn new(session_id: &str, turn_number: u64, role: ChatRole, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            turn_number,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// 单轮处理状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    Extracted,
    Deduped,
    GraphWritten,
    QuestionSelected,
    Composed,
    ExtractionFailed,
    GraphWriteFailed,
}

impl TurnState {
    /// 是否允许迁移到 `next`
    pub fn can_advance(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Received, Extracted)
                | (Received, ExtractionFailed)
                | (Extracted, Deduped)
                | (Deduped, GraphWritten)
                | (Deduped, GraphWriteFailed)
                | (GraphWritten, QuestionSelected)
                | (QuestionSelected, Composed)
                | (ExtractionFailed, Composed)
                | (GraphWriteFailed, Composed)
        )
    }

    /// 校验并迁移状态
    pub fn advance(&mut self, next: TurnState) -> Result<()> {
        if !self.can_advance(next) {
            return Err(AppError::Internal(format!(
                "非法的轮次状态迁移: {:?} -> {:?}",
                self, next
            )));
        }
        tracing::debug!("Turn state {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        self == TurnState::Composed
    }
}
