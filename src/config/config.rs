use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 存储后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储（开发/测试）
    #[default]
    Memory,
    /// SurrealDB
    Surrealdb,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 存储后端
    pub backend: StorageBackend,
    /// SurrealDB 连接地址
    pub url: String,
    /// 命名空间
    pub namespace: String,
    /// 数据库名称
    pub database: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// 模型名称
    pub model_name: String,
    /// Embedding 后端类型: "ollama" 或 "simple"
    pub backend: String,
    /// 向量维度
    pub dimension: usize,
    /// Ollama 服务器地址
    pub ollama_url: String,
    /// Ollama 请求超时（秒）
    pub ollama_timeout: u64,
}

/// LLM 协作方配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// 提供方: "openai"（兼容 chat completions 的端点）或 "stub"
    pub provider: String,
    /// 服务地址
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// API 密钥
    pub api_key: Option<String>,
    /// HTTP 请求超时（秒），流水线自身的截止时间更短
    pub request_timeout: u64,
}

/// 下一问题排序维度权重
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiveWeights {
    pub impact: f64,
    pub leverage: f64,
    pub momentum: f64,
    pub connectivity: f64,
    pub gap_criticality: f64,
}

impl Default for DiveWeights {
    fn default() -> Self {
        Self {
            impact: 0.2,
            leverage: 0.2,
            momentum: 0.2,
            connectivity: 0.2,
            gap_criticality: 0.2,
        }
    }
}

impl DiveWeights {
    pub fn sum(&self) -> f64 {
        self.impact + self.leverage + self.momentum + self.connectivity + self.gap_criticality
    }
}

/// 流水线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 上下文中保留的最近轮次数 (K)
    pub recent_turn_limit: usize,
    /// 上下文中的相关节点数 (N, 10-20)
    pub relevant_node_limit: usize,
    /// 候选最低总分
    pub min_score: u8,
    /// 歧义区下界
    pub ambiguous_threshold: f32,
    /// 直接合并阈值
    pub merge_threshold: f32,
    /// 新节点两两连边的上限，超过后改为星型连接
    pub pairwise_edge_limit: usize,
    /// 响应中返回的 nugget 上限
    pub max_captured_nuggets: usize,
    /// 抽取调用超时（毫秒）
    pub extraction_timeout_ms: u64,
    /// 去重确认调用超时（毫秒）
    pub confirmation_timeout_ms: u64,
    /// 问题生成调用超时（毫秒）
    pub question_timeout_ms: u64,
    /// Embedding 调用超时（毫秒）
    pub embedding_timeout_ms: u64,
    /// 重试前的退避（毫秒）
    pub retry_backoff_ms: u64,
    /// 下一问题排序权重
    pub question_weights: DiveWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_turn_limit: 5,
            relevant_node_limit: 15,
            min_score: 30,
            ambiguous_threshold: 0.80,
            merge_threshold: 0.92,
            pairwise_edge_limit: 4,
            max_captured_nuggets: 4,
            extraction_timeout_ms: 5_000,
            confirmation_timeout_ms: 2_000,
            question_timeout_ms: 3_000,
            embedding_timeout_ms: 3_000,
            retry_backoff_ms: 200,
            question_weights: DiveWeights::default(),
        }
    }
}

impl PipelineConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_millis(self.question_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// LLM 配置
    pub llm: LlmConfig,
    /// 流水线配置
    pub pipeline: PipelineConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            database: DatabaseConfig {
                backend: StorageBackend::Memory,
                url: "ws://localhost:8000".into(),
                namespace: "sponge".into(),
                database: "graph".into(),
                username: "root".into(),
                password: "root".into(),
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                max_request_size: 2 * 1024 * 1024,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            embedding: EmbeddingConfig {
                model_name: "nomic-embed-text".into(),
                backend: "simple".into(),
                dimension: 384,
                ollama_url: "http://localhost:11434".into(),
                ollama_timeout: 10,
            },
            llm: LlmConfig {
                provider: "stub".into(),
                base_url: "https://api.openai.com".into(),
                model: "gpt-4o-mini".into(),
                api_key: None,
                request_timeout: 30,
            },
            pipeline: PipelineConfig::default(),
            app_name: "sponge".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.database.backend = StorageBackend::Surrealdb;
        config.embedding.backend = "ollama".into();
        config.llm.provider = "openai".into();
        config
    }
}
