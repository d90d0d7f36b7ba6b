//! 会话级串行化
//!
//! 同一会话的轮次和 nugget 修改逐个执行；不同会话互不阻塞。

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 会话锁表
#[derive(Debug, Default, Clone)]
pub struct SessionLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话锁，持有期间同一会话的其他操作等待
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("s1").await;

        let other = locks.clone();
        let waiting = tokio::spawn(async move { other.acquire("s1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        assert!(waiting.await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;
        let acquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
        assert!(acquired.is_ok());
    }
}
