use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

const MAX_ATTEMPTS: u32 = 2;

/// 带超时的协作方调用：瞬时失败重试一次，之后把错误交给调用方
///
/// 超时后 future 被丢弃，调用随之取消。
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    backoff: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    "{} failed (attempt {}), retrying in {}ms: {}",
                    operation,
                    attempt,
                    backoff.as_millis(),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempt(s): {}", operation, attempt, e);
                return Err(e);
            }
        }
    }
}
