//! Headless Agent 运行时
//!
//! 供终端 REPL 与 HTTP 入口调用的无界面逻辑：
//! create_agent_components 按配置构建模型网关、实体存储、工具执行器与编排器；
//! process_chat 对一次请求（完整的 {role, content} 历史）施加截止时间，
//! 在网关暂时性失败且尚无变更落库时按退避整体重试，返回最终回答或类型化失败。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{
    load_system_prompt, AgentError, Orchestrator, OrchestratorConfig, RecoveryAction,
    RecoveryEngine, RunStats, DEFAULT_EXHAUSTED_MESSAGE,
};
use crate::llm::{
    create_deepseek_client, LlmClient, OpenAiClient, ScriptedLlmClient, OPENAI_DEFAULT_MODEL,
};
use crate::memory::{Message, Role};
use crate::store::{EntityStore, InMemoryEntityStore, SqliteEntityStore};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 入站消息（调用方只应发送 user / assistant）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

/// 请求失败：error 为机器可读类别，message 为给用户看的说明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFailure {
    pub error: String,
    pub message: String,
}

impl From<&AgentError> for ChatFailure {
    fn from(e: &AgentError) -> Self {
        Self {
            error: e.kind().to_string(),
            message: e.user_message(),
        }
    }
}

/// 预构建的 Agent 组件，可多请求并发共享
pub struct AgentComponents {
    pub orchestrator: Orchestrator,
    pub recovery: RecoveryEngine,
    pub request_timeout: Duration,
    pub store: Arc<dyn EntityStore>,
}

/// 按 [llm].provider 选择模型网关；mock 或缺少 key 时使用离线脚本客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match create_remote_client(cfg) {
        Some(client) => {
            tracing::info!(
                provider = %cfg.llm.provider,
                model = client.model(),
                base_url = client.base_url(),
                "Using remote LLM"
            );
            Arc::new(client)
        }
        None => {
            tracing::warn!(
                provider = %cfg.llm.provider,
                "No API key set or provider mock/unknown, using offline scripted LLM"
            );
            Arc::new(ScriptedLlmClient::echo_search())
        }
    }
}

/// openai / deepseek 且有 key 时构建 HTTP 客户端；未配置 model 时取该后端的默认模型
pub fn create_remote_client(cfg: &AppConfig) -> Option<OpenAiClient> {
    let api_key = cfg.llm.api_key.as_deref();
    let model = cfg.llm.model.as_deref();
    let base_url = cfg.llm.base_url.as_deref();
    match cfg.llm.provider.to_lowercase().as_str() {
        "deepseek" if api_key.is_some() || std::env::var("DEEPSEEK_API_KEY").is_ok() => Some(
            create_deepseek_client(base_url, model, api_key, cfg.llm.timeout_secs),
        ),
        "openai" if api_key.is_some() || std::env::var("OPENAI_API_KEY").is_ok() => {
            Some(OpenAiClient::with_timeout(
                base_url,
                model.unwrap_or(OPENAI_DEFAULT_MODEL),
                api_key,
                cfg.llm.timeout_secs,
            ))
        }
        _ => None,
    }
}

/// 按 [store].backend 打开实体存储
pub fn create_store_from_config(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EntityStore>> {
    match cfg.store.backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryEntityStore::new())),
        "sqlite" => {
            let store = SqliteEntityStore::open(&cfg.store.sqlite_path).with_context(|| {
                format!("cannot open sqlite store at {}", cfg.store.sqlite_path.display())
            })?;
            tracing::info!(path = %cfg.store.sqlite_path.display(), "Using SQLite entity store");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown store backend '{other}' (expected memory or sqlite)"),
    }
}

/// 从配置创建全部组件
pub fn create_agent_components(cfg: &AppConfig) -> anyhow::Result<AgentComponents> {
    let llm = create_llm_from_config(cfg);
    let store = create_store_from_config(cfg)?;
    let system_prompt = load_system_prompt(
        cfg.app
            .system_prompt_path
            .as_ref()
            .and_then(|p| p.to_str()),
    );
    Ok(build_agent_components(cfg, llm, store, system_prompt))
}

/// 用给定的网关与存储组装组件（测试与嵌入场景）
pub fn build_agent_components(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn EntityStore>,
    system_prompt: String,
) -> AgentComponents {
    let registry = ToolRegistry::directory(store.clone(), cfg.tools.search_limit);
    let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
    let orchestrator = Orchestrator::new(
        llm,
        executor,
        system_prompt,
        OrchestratorConfig {
            max_iterations: cfg.agent.max_iterations,
            trust_created_ids: cfg.agent.trust_created_ids,
            exhausted_message: cfg
                .agent
                .exhausted_message
                .clone()
                .unwrap_or_else(|| DEFAULT_EXHAUSTED_MESSAGE.to_string()),
        },
    );
    AgentComponents {
        orchestrator,
        recovery: RecoveryEngine::new(cfg.agent.max_retries, cfg.agent.retry_base_delay_ms),
        request_timeout: Duration::from_secs(cfg.agent.request_timeout_secs.max(1)),
        store,
    }
}

/// 处理一次对话请求
pub async fn process_chat(
    components: &AgentComponents,
    request: ChatRequest,
) -> Result<ChatResponse, ChatFailure> {
    let history: Vec<Message> = request
        .messages
        .into_iter()
        .map(|m| Message {
            role: m.role,
            content: m.content,
            tool_call_id: None,
            tool_calls: Vec::new(),
        })
        .collect();

    // 截止时间到达时取消：不再开始新的迭代，已落库的变更保留
    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = components.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result = run_with_retries(components, history, &cancel).await;
    deadline.abort();

    result
        .map(|content| ChatResponse { content })
        .map_err(|e| ChatFailure::from(&e))
}

async fn run_with_retries(
    components: &AgentComponents,
    history: Vec<Message>,
    cancel: &CancellationToken,
) -> Result<String, AgentError> {
    let mut attempt = 0u32;
    loop {
        let mut stats = RunStats::default();
        let err = match components
            .orchestrator
            .run_observed(history.clone(), cancel.clone(), &mut stats)
            .await
        {
            Ok(answer) => return Ok(answer.content),
            Err(e) => e,
        };

        match components.recovery.handle(&err, attempt, &stats) {
            RecoveryAction::RetryAfter(delay) => {
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request after transient gateway failure"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            RecoveryAction::Abort => {
                tracing::warn!(error = %err, kind = err.kind(), "request failed");
                return Err(err);
            }
        }
    }
}
