//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 直接调用 `POST {base_url}/chat/completions`（可配置 base_url），支持 DeepSeek、OpenAI、自建代理等。
//! 请求携带 tools（function 定义）与 tool_choice=auto；响应中的 tool_calls 转为 ToolCall。
//! HTTP 状态在这里映射为 LlmError：429 → RateLimited / QuotaExhausted，402 → QuotaExhausted，其余失败 → Unavailable。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{Completion, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

// ---- 线上格式 ----

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn to_wire(m: &Message) -> WireMessage {
    let tool_calls = (m.role == Role::Assistant && !m.tool_calls.is_empty()).then(|| {
        m.tool_calls
            .iter()
            .map(|c| WireToolCall {
                id: c.id.clone(),
                kind: function_type(),
                function: WireFunctionCall {
                    name: c.name.clone(),
                    arguments: match &c.arguments {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    },
                },
            })
            .collect()
    });
    let content = if tool_calls.is_some() && m.content.is_empty() {
        None
    } else {
        Some(m.content.clone())
    };
    WireMessage {
        role: m.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: m.tool_call_id.clone(),
    }
}

/// 解析 function.arguments；非法 JSON 保留为字符串，交给 schema 校验回报给模型
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn from_wire(message: WireMessage) -> Completion {
    let content = message.content.unwrap_or_default();
    match message.tool_calls {
        Some(calls) if !calls.is_empty() => Completion::ToolCalls {
            content,
            calls: calls
                .into_iter()
                .map(|c| ToolCall::new(c.id, c.function.name, parse_arguments(&c.function.arguments)))
                .collect(),
        },
        _ => Completion::Answer(content),
    }
}

/// 非 2xx 状态 → LlmError
pub fn classify_status(status: StatusCode, retry_after: Option<&str>, body: &str) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let lower = body.to_lowercase();
            if lower.contains("insufficient_quota") || lower.contains("quota") {
                LlmError::QuotaExhausted
            } else {
                LlmError::RateLimited {
                    retry_after_ms: retry_after
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .filter(|secs| *secs >= 0.0)
                        .map(|secs| (secs * 1000.0) as u64),
                }
            }
        }
        StatusCode::PAYMENT_REQUIRED => LlmError::QuotaExhausted,
        other => LlmError::Unavailable(format!("HTTP {}: {}", other.as_u16(), preview(body))),
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > 200 {
        format!("{}...", body.chars().take(200).collect::<String>())
    } else {
        body.to_string()
    }
}

/// OpenAI 兼容客户端：持有 reqwest Client、base_url 与 model 名
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        Self::with_timeout(base_url, model, api_key, 60)
    }

    pub fn with_timeout(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());
        let http = match Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, timeout_secs, "HTTP client builder failed, using defaults without timeout");
                Client::new()
            }
        };

        Self {
            http,
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Completion, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.parameters,
                    },
                })
                .collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, retry_after.as_deref(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "model gateway call failed");
            return Err(err);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &body.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        Ok(from_wire(choice.message))
    }
}
