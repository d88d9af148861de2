//! 错误恢复引擎（调用方一侧）
//!
//! 循环内部从不重试网关失败；是否整体重试一次请求由这里决定：
//! 只有暂时性失败（限流 / 不可用）、且失败前没有任何变更落库、且未超过最大次数时才重试，
//! 等待时间为指数退避（base * 2^attempt），不短于服务端给出的 Retry-After。

use std::time::Duration;

use crate::core::{AgentError, RecoveryAction, RunStats};

/// 退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2, 500)
    }
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// attempt 为已完成的重试次数（首次失败时为 0）；stats 为失败那次运行的统计
    pub fn handle(&self, err: &AgentError, attempt: u32, stats: &RunStats) -> RecoveryAction {
        if !err.is_transient() || attempt >= self.max_retries {
            return RecoveryAction::Abort;
        }
        if stats.mutations_applied > 0 {
            tracing::warn!(
                mutations = stats.mutations_applied,
                "not retrying: directory already modified by the failed run"
            );
            return RecoveryAction::Abort;
        }
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF);
        let delay = match err {
            AgentError::GatewayRateLimited {
                retry_after_ms: Some(ms),
            } => backoff.max(Duration::from_millis(*ms)).min(MAX_BACKOFF),
            _ => backoff,
        };
        RecoveryAction::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> RunStats {
        RunStats::default()
    }

    #[test]
    fn test_rate_limit_backoff_doubles() {
        let engine = RecoveryEngine::new(3, 100);
        let err = AgentError::GatewayRateLimited { retry_after_ms: None };
        assert_eq!(
            engine.handle(&err, 0, &clean()),
            RecoveryAction::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            engine.handle(&err, 2, &clean()),
            RecoveryAction::RetryAfter(Duration::from_millis(400))
        );
        assert_eq!(engine.handle(&err, 3, &clean()), RecoveryAction::Abort);
    }

    #[test]
    fn test_retry_after_header_respected() {
        let engine = RecoveryEngine::new(2, 100);
        let err = AgentError::GatewayRateLimited {
            retry_after_ms: Some(2000),
        };
        assert_eq!(
            engine.handle(&err, 0, &clean()),
            RecoveryAction::RetryAfter(Duration::from_millis(2000))
        );
    }

    #[test]
    fn test_quota_and_cancel_never_retried() {
        let engine = RecoveryEngine::new(5, 100);
        assert_eq!(
            engine.handle(&AgentError::GatewayQuotaExhausted, 0, &clean()),
            RecoveryAction::Abort
        );
        assert_eq!(engine.handle(&AgentError::Cancelled, 0, &clean()), RecoveryAction::Abort);
        assert_eq!(
            engine.handle(&AgentError::EmptyTranscript, 0, &clean()),
            RecoveryAction::Abort
        );
    }

    #[test]
    fn test_no_retry_after_mutation() {
        let engine = RecoveryEngine::new(5, 100);
        let stats = RunStats {
            model_calls: 2,
            tool_calls: 2,
            mutations_applied: 1,
        };
        assert_eq!(
            engine.handle(&AgentError::GatewayUnavailable("down".into()), 0, &stats),
            RecoveryAction::Abort
        );
    }
}
