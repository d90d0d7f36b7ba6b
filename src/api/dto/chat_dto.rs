//! 对话轮次 DTO
//!
//! 定义对话轮次的请求数据结构，响应直接使用 [`TurnOutcome`](crate::services::TurnOutcome)。

use serde::Deserialize;
use validator::Validate;

use crate::services::orchestrator::MAX_MESSAGE_CHARS;

/// 校验器的长度上限只接受 u64
const MAX_MESSAGE_LEN: u64 = MAX_MESSAGE_CHARS as u64;

/// 对话轮次请求
#[derive(Debug, Deserialize, Validate)]
pub struct ChatTurnRequest {
    /// 会话 ID，省略时新建会话
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
    /// 用户输入的原始文本
    #[validate(length(min = 1, max = MAX_MESSAGE_LEN))]
    pub message: String,
}
