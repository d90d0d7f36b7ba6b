use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 未命名项目的默认名称
pub const DEFAULT_PROJECT_NAME: &str = "Untitled";

/// 会话实体
///
/// 一次 brain-dump 项目，是对话轮次与图节点的所有者。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// 会话唯一标识
    pub id: String,

    /// 项目名称
    pub project_name: String,

    /// 主题
    pub topic: Option<String>,

    /// 目标受众
    pub audience: Option<String>,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// 创建新会话
    pub fn new() -> Self {
        Self::with_id(&Uuid::new_v4().to_string())
    }

    /// 以指定 ID 创建会话（首轮对话时使用调用方给出的 ID）
    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            topic: None,
            audience: None,
            created_at: Utc::now(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
