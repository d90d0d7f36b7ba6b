//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(String),

    /// 图写入失败（事务已整体回滚，可用同一批决策重试）
    #[error("图写入失败: {0}")]
    GraphWrite(String),

    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 参数验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 外部协作方（LLM / Embedding）调用超时
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 外部协作方调用失败
    #[error("协作服务错误: {0}")]
    Collaborator(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 嵌入模型错误
    #[error("嵌入模型错误: {0}")]
    Embedding(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl AppError {
    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_) | AppError::Collaborator(_) | AppError::GraphWrite(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Collaborator(e.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for AppError {
    fn from(e: surrealdb::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// Axum response implementation for AppError
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = (&self).into();
        let body = Json(ErrorResponse::new(&code, &self.to_string()));
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 是否可重试
    pub retryable: bool,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            retryable: matches!(code, "TIMEOUT" | "SERVICE_UNAVAILABLE" | "GRAPH_WRITE_FAILED"),
        }
    }
}

/// HTTP 状态码映射
impl From<&AppError> for (u16, String) {
    fn from(err: &AppError) -> (u16, String) {
        match err {
            AppError::NotFound(_) => (404, "NOT_FOUND".to_string()),
            AppError::Validation(_) => (400, "BAD_REQUEST".to_string()),
            AppError::Timeout(_) => (504, "TIMEOUT".to_string()),
            AppError::Collaborator(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::GraphWrite(_) => (503, "GRAPH_WRITE_FAILED".to_string()),
            AppError::Embedding(_) => (503, "SERVICE_UNAVAILABLE".to_string()),
            AppError::Database(_) => (500, "INTERNAL_ERROR".to_string()),
            _ => (500, "INTERNAL_ERROR".to_string()),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let (status, code): (u16, String) = (&AppError::Timeout("extraction".into())).into();
        assert_eq!(status, 504);
        assert_eq!(code, "TIMEOUT");

        let (status, _): (u16, String) = (&AppError::NotFound("node".into())).into();
        assert_eq!(status, 404);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout("x".into()).is_transient());
        assert!(AppError::GraphWrite("x".into()).is_transient());
        assert!(!AppError::Validation("x".into()).is_transient());
    }

    #[test]
    fn test_error_response_retryable() {
        assert!(ErrorResponse::new("TIMEOUT", "slow").retryable);
        assert!(!ErrorResponse::new("BAD_REQUEST", "empty").retryable);
    }
}
