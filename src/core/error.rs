//! Agent 错误类型与恢复动作
//!
//! 只有终止循环的错误才是 AgentError（网关失败、取消、空会话、配置）；
//! 工具层失败是 ToolResult 负载，不会出现在这里。
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryAfter / Abort。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 终止一次编排的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("model gateway rate limited")]
    GatewayRateLimited { retry_after_ms: Option<u64> },

    #[error("model gateway quota exhausted")]
    GatewayQuotaExhausted,

    #[error("model gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// 调用方的截止时间已到或主动取消
    #[error("request cancelled before completion")]
    Cancelled,

    #[error("transcript contains no user message")]
    EmptyTranscript,

    #[error("config error: {0}")]
    ConfigError(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited { retry_after_ms } => AgentError::GatewayRateLimited { retry_after_ms },
            LlmError::QuotaExhausted => AgentError::GatewayQuotaExhausted,
            LlmError::Unavailable(msg) => AgentError::GatewayUnavailable(msg),
            LlmError::InvalidResponse(msg) => {
                AgentError::GatewayUnavailable(format!("invalid response: {msg}"))
            }
        }
    }
}

impl AgentError {
    /// 机器可读的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::GatewayRateLimited { .. } => "gateway_rate_limited",
            AgentError::GatewayQuotaExhausted => "gateway_quota_exhausted",
            AgentError::GatewayUnavailable(_) => "gateway_unavailable",
            AgentError::Cancelled => "timeout",
            AgentError::EmptyTranscript => "empty_transcript",
            AgentError::ConfigError(_) => "config_error",
        }
    }

    /// 展示给用户的自然语言说明
    pub fn user_message(&self) -> String {
        match self {
            AgentError::GatewayRateLimited { .. } => {
                "Le service est momentanément surchargé. Merci de réessayer dans quelques instants.".to_string()
            }
            AgentError::GatewayQuotaExhausted => {
                "Le quota du service d'assistance est épuisé. Merci de contacter un administrateur.".to_string()
            }
            AgentError::GatewayUnavailable(_) => {
                "Le service d'assistance est indisponible pour le moment. Merci de réessayer plus tard.".to_string()
            }
            AgentError::Cancelled => {
                "Le délai de traitement a été dépassé. Les modifications déjà confirmées sont conservées ; vérifiez l'annuaire avant de réessayer.".to_string()
            }
            AgentError::EmptyTranscript => "Je n'ai reçu aucun message à traiter.".to_string(),
            AgentError::ConfigError(_) => {
                "L'assistant est mal configuré. Merci de contacter un administrateur.".to_string()
            }
        }
    }

    /// 是否属于可重试的暂时性失败
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::GatewayRateLimited { .. } | AgentError::GatewayUnavailable(_)
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 等待后整体重试本次请求
    RetryAfter(Duration),
    /// 直接把错误交给调用方
    Abort,
}
