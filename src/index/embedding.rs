//! 嵌入模型服务

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::config::EmbeddingConfig;
use crate::error::{AppError, Result};
use crate::index::similarity::normalize;

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

/// 离线嵌入模型
///
/// 把小写词哈希进固定维度后归一化，同一文本永远得到同一向量。
pub struct SimpleEmbeddingModel {
    dimension: usize,
}

impl SimpleEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl EmbeddingModel for SimpleEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut sum = vec![0.0; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let idx = self.bucket(&word.to_lowercase());
            sum[idx] += 1.0;
        }

        Ok(normalize(sum))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let embedding = self.encode(text).await?;
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama Embedding 模型客户端
pub struct OllamaEmbeddingModel {
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingModel {
    pub fn new(
        base_url: &str,
        model_name: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model_name: model_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            dimension,
        })
    }

    async fn embed(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&serde_json::json!({
                "model": self.model_name,
                "input": texts,
                "truncate": true
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Ollama embedding failed: {}",
                error_text
            )));
        }

        let embed_response: OllamaEmbedResponse = response.json().await?;
        for embedding in &embed_response.embeddings {
            if embedding.len() != self.dimension {
                return Err(AppError::Embedding(format!(
                    "Expected dimension {}, got {}",
                    self.dimension,
                    embedding.len()
                )));
            }
        }
        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Ollama returned no embedding".to_string()))
    }

    async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Ollama 支持批量输入，但为了稳定性，分批处理
        let batch_size = 32;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let embeddings = self.embed(chunk.to_vec()).await?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub fn create_embedding_model(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>> {
    match config.backend.as_str() {
        "ollama" => {
            let model = OllamaEmbeddingModel::new(
                &config.ollama_url,
                &config.model_name,
                config.dimension,
                Duration::from_secs(config.ollama_timeout),
            )?;
            tracing::info!("Using Ollama embedding model: {}", config.model_name);
            Ok(Arc::new(model))
        }
        "simple" => Ok(Arc::new(SimpleEmbeddingModel::new(config.dimension))),
        other => Err(AppError::Config(format!(
            "Unknown embedding backend: {}",
            other
        ))),
    }
}
