//! Nugget DTO
//!
//! 定义 nugget 列表、反馈和状态接口的请求与响应数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{GapType, Nugget, NuggetStatus, NuggetType, UserFeedback};
use crate::services::nugget::{NuggetQuery, NuggetSort};

/// Nugget 列表查询参数
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListNuggetsParams {
    /// 类型过滤
    pub nugget_type: Option<NuggetType>,
    /// 状态过滤
    pub status: Option<NuggetStatus>,
    /// 排序字段
    pub sort_by: Option<NuggetSort>,
}

impl From<ListNuggetsParams> for NuggetQuery {
    fn from(params: ListNuggetsParams) -> Self {
        Self {
            nugget_type: params.nugget_type,
            status: params.status,
            sort_by: params.sort_by.unwrap_or_default(),
        }
    }
}

/// Nugget 列表项
#[derive(Debug, Serialize)]
pub struct NuggetListItem {
    pub nugget_id: String,
    pub node_id: String,
    pub title: String,
    pub short_summary: String,
    pub nugget_type: NuggetType,
    pub score: u8,
    pub status: NuggetStatus,
    pub user_feedback: Option<UserFeedback>,
    pub missing_fields: Vec<GapType>,
    pub created_at: DateTime<Utc>,
}

impl From<Nugget> for NuggetListItem {
    fn from(nugget: Nugget) -> Self {
        Self {
            nugget_id: nugget.id,
            node_id: nugget.node_id,
            title: nugget.title,
            short_summary: nugget.summary,
            nugget_type: nugget.nugget_type,
            score: nugget.score,
            status: nugget.status,
            user_feedback: nugget.user_feedback,
            missing_fields: nugget.missing_fields,
            created_at: nugget.created_at,
        }
    }
}

/// Nugget 列表响应
#[derive(Debug, Serialize)]
pub struct NuggetListResponse {
    pub nuggets: Vec<NuggetListItem>,
    pub total: usize,
}

/// 反馈请求
#[derive(Debug, Deserialize)]
pub struct NuggetFeedbackRequest {
    pub feedback: UserFeedback,
}

/// 状态变更请求
#[derive(Debug, Deserialize)]
pub struct NuggetStatusRequest {
    pub status: NuggetStatus,
}
