//! 语言模型协作方
//!
//! 流水线只通过 [`LanguageModel`] 访问 LLM：抽取、去重确认、问题生成三个端点。

pub mod client;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::models::{GapType, Node, NodeType, Nugget};

pub use client::HttpLanguageModel;
pub use retry::call_with_retry;
pub use stub::StubLanguageModel;

/// 抽取请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRequest {
    /// 当前用户消息
    pub message: String,
    /// 渲染好的会话上下文
    pub context: String,
    /// 纠错重试时附带的上一次错误
    pub correction: Option<Correction>,
}

/// 纠错信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Correction {
    pub error: String,
    pub previous_response: String,
}

/// 去重确认时发送的候选摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSummary {
    pub node_type: NodeType,
    pub title: String,
    pub summary: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 返回原始响应文本，由调用方做结构化校验
    async fn extract(&self, request: &ExtractionRequest) -> Result<String>;

    /// 候选与已有节点是否表达同一个观点
    async fn confirm_duplicate(&self, candidate: &CandidateSummary, existing: &Node)
    -> Result<bool>;

    /// 为 nugget 的某个缺口生成一个追问
    async fn generate_question(&self, nugget: &Nugget, gap: GapType) -> Result<String>;
}

pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => {
            tracing::info!("Using chat completions endpoint: {}", config.base_url);
            Ok(Arc::new(HttpLanguageModel::new(config)?))
        }
        "stub" => Ok(Arc::new(StubLanguageModel)),
        other => Err(AppError::Config(format!("Unknown LLM provider: {}", other))),
    }
}
