//! 存储层模块
//!
//! 提供知识图持久化服务，支持进程内存储和 SurrealDB。

pub mod batch;
pub mod factory;
pub mod memory;
pub mod repository;

#[cfg(feature = "surrealdb")]
pub mod surrealdb;

pub use batch::{CommitReceipt, EmbeddingRefresh, GraphWriteBatch, NuggetRevision};
pub use factory::StorageFactory;
pub use memory::InMemoryGraphStore;
pub use repository::{GraphStore, ScoredNode};
