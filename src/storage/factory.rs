//! 存储工厂模块
//!
//! 根据配置创建相应的图存储实例。

use std::sync::Arc;

use crate::config::config::{DatabaseConfig, StorageBackend};
use crate::error::{AppError, Result};
use crate::storage::memory::InMemoryGraphStore;
use crate::storage::repository::GraphStore;

#[cfg(feature = "surrealdb")]
use crate::storage::surrealdb::{SurrealGraphStore, SurrealPool};

/// 存储工厂
pub struct StorageFactory;

impl StorageFactory {
    /// 根据配置创建存储实例
    pub async fn create(config: &DatabaseConfig) -> Result<Arc<dyn GraphStore>> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory graph store");
                Ok(Arc::new(InMemoryGraphStore::new()))
            }
            #[cfg(feature = "surrealdb")]
            StorageBackend::Surrealdb => {
                let pool = SurrealPool::new(config).await?;
                Ok(Arc::new(SurrealGraphStore::new(pool)))
            }
            #[cfg(not(feature = "surrealdb"))]
            StorageBackend::Surrealdb => Err(AppError::Config(
                "SurrealDB feature is not enabled. Enable 'surrealdb' feature to use it.".into(),
            )),
        }
    }
}

/// 校验后端配置
pub fn check_backend(config: &DatabaseConfig) -> Result<()> {
    if config.backend == StorageBackend::Surrealdb && config.url.trim().is_empty() {
        return Err(AppError::Config("database.url is required for surrealdb".into()));
    }
    Ok(())
}
