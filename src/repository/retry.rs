// ==========================================
// 目录导入引擎 - 存储往返控制
// ==========================================
// 职责: 有界重试 + 指数退避 + 单次超时 + 取消令牌
// 约束: 仅对幂等往返（只读查询 / upsert）使用
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 往返策略
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripPolicy {
    /// 最大尝试次数（含首次）
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// 单次往返超时
    pub timeout: Duration,
}

impl Default for RoundTripPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// 计算下一次退避时间（不超过 max_backoff）
pub fn next_delay(current: Duration, policy: &RoundTripPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_backoff)
}

/// 执行一次存储往返
///
/// # 行为
/// - 取消令牌触发 → RepositoryError::Cancelled
/// - 单次超时 → RepositoryError::Timeout（可重试）
/// - 非瞬时错误立即返回
pub async fn round_trip<T, F, Fut>(
    policy: &RoundTripPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut call: F,
) -> RepositoryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepositoryResult<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            outcome = tokio::time::timeout(policy.timeout, call()) => match outcome {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Timeout { operation: operation.to_string() }),
            },
        };

        match result {
            Ok(value) => {
                debug!(operation, attempt, "存储往返完成");
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "存储往返失败，准备重试"
                );
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay, policy);
    }
}
