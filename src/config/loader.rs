use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 合并顺序：
    /// 1. 开发环境默认值
    /// 2. ./config.toml（存在时）
    /// 3. SPONGE_ 前缀的环境变量（`__` 分隔层级）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        Self::figment(&path).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SPONGE_").split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.embedding.dimension == 0 {
            return Err(ConfigValidationError::InvalidDimension);
        }

        let pipeline = &config.pipeline;
        if !(10..=20).contains(&pipeline.relevant_node_limit) {
            return Err(ConfigValidationError::RelevantNodeLimit(
                pipeline.relevant_node_limit,
            ));
        }

        if !(0.0..=1.0).contains(&pipeline.ambiguous_threshold)
            || !(0.0..=1.0).contains(&pipeline.merge_threshold)
            || pipeline.ambiguous_threshold >= pipeline.merge_threshold
        {
            return Err(ConfigValidationError::Thresholds {
                low: pipeline.ambiguous_threshold,
                high: pipeline.merge_threshold,
            });
        }

        let weights = &pipeline.question_weights;
        let all = [
            weights.impact,
            weights.leverage,
            weights.momentum,
            weights.connectivity,
            weights.gap_criticality,
        ];
        if all.iter().any(|w| *w < 0.0 || !w.is_finite()) || weights.sum() <= 0.0 {
            return Err(ConfigValidationError::QuestionWeights);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("向量维度无效，必须大于 0")]
    InvalidDimension,

    #[error("相关节点数量必须在 10 到 20 之间，当前为 {0}")]
    RelevantNodeLimit(usize),

    #[error("相似度阈值无效: 下界 {low} 必须小于上界 {high}，且都在 [0, 1] 内")]
    Thresholds { low: f32, high: f32 },

    #[error("问题排序权重必须非负且总和大于 0")]
    QuestionWeights,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}
