//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / 脚本化 Mock）实现 LlmClient：complete(transcript, catalog)
//! 返回最终文本或一批工具调用；传输层状态映射为类型化的 LlmError。
//! 上层只与 Message / ToolCall / ToolSpec 打交道，不感知线上格式。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::{Message, ToolCall};

/// 发给模型的单个工具定义（name / description / JSON Schema）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 一次模型调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// 最终回答
    Answer(String),
    /// 请求执行工具（content 为模型附带的文本，可为空）
    ToolCalls { content: String, calls: Vec<ToolCall> },
}

/// 模型网关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("rate limited by model gateway")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("model gateway quota exhausted")]
    QuotaExhausted,

    #[error("model gateway unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from model gateway: {0}")]
    InvalidResponse(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成：transcript + 工具目录 → 回答或工具调用
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Completion, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
