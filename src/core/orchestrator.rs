//! 对话编排器（主控循环）
//!
//! 每次请求：system 指令 + 调用方历史 → 调模型 → 若返回工具调用则按顺序逐个执行、把结果追加到 transcript，
//! 再调模型；直到模型给出最终回答，或模型调用次数达到 max_iterations（返回降级回答）。
//! 网关失败立即终止并以类型化错误返回（循环内不重试）；工具失败只作为结果回传模型。
//! transcript 与 VerificationGuard 均为请求级，运行结束即丢弃。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::prompt::{DEFAULT_EXHAUSTED_MESSAGE, EMPTY_ANSWER_FALLBACK};
use crate::core::{AgentError, FinalAnswer, LoopPhase, Outcome, RunStats};
use crate::llm::{Completion, LlmClient};
use crate::memory::{Message, Transcript};
use crate::tools::{ToolExecutor, VerificationGuard};

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 单次请求最多调用模型的次数
    pub max_iterations: usize,
    /// 本次请求新建实体的标识符视为已校验
    pub trust_created_ids: bool,
    /// 达到上限时返回给用户的话
    pub exhausted_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            trust_created_ids: true,
            exhausted_message: DEFAULT_EXHAUSTED_MESSAGE.to_string(),
        }
    }
}

/// 编排器：无跨请求可变状态，可被多个请求并发共享
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    system_prompt: String,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        system_prompt: impl Into<String>,
        mut config: OrchestratorConfig,
    ) -> Self {
        config.max_iterations = config.max_iterations.max(1);
        Self {
            llm,
            executor,
            system_prompt: system_prompt.into(),
            config,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    /// 处理一次请求（无截止时间）
    pub async fn run(&self, history: Vec<Message>) -> Result<FinalAnswer, AgentError> {
        self.run_with_cancel(history, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<FinalAnswer, AgentError> {
        let mut stats = RunStats::default();
        self.run_observed(history, cancel, &mut stats).await
    }

    /// 同 run_with_cancel，但边运行边把计数写入 stats，失败时调用方仍可读取
    pub async fn run_observed(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
        stats: &mut RunStats,
    ) -> Result<FinalAnswer, AgentError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("orchestrator", run_id = %run_id);
        self.run_inner(history, cancel, stats).instrument(span).await
    }

    async fn run_inner(
        &self,
        history: Vec<Message>,
        cancel: CancellationToken,
        stats: &mut RunStats,
    ) -> Result<FinalAnswer, AgentError> {
        let mut transcript = Transcript::new(&self.system_prompt, history);
        if !transcript.has_user_message() {
            return Err(AgentError::EmptyTranscript);
        }

        let mut guard = VerificationGuard::new(self.config.trust_created_ids);
        let catalog = self.executor.catalog();
        let (init_prompt, init_completion, _) = self.llm.token_usage();
        let mut phase = LoopPhase::Start;
        tracing::info!(messages = transcript.len(), phase = phase.as_str(), "request started");

        loop {
            if stats.model_calls >= self.config.max_iterations {
                phase = LoopPhase::Exhausted;
                tracing::warn!(
                    model_calls = stats.model_calls,
                    tool_calls = stats.tool_calls,
                    phase = phase.as_str(),
                    "iteration cap reached"
                );
                let content = self.config.exhausted_message.clone();
                transcript.push(Message::assistant(content.clone()));
                return Ok(FinalAnswer {
                    content,
                    outcome: Outcome::Exhausted,
                    stats: *stats,
                    transcript: transcript.into_messages(),
                });
            }

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            phase = LoopPhase::AwaitingModel;
            tracing::debug!(turn = stats.model_calls + 1, phase = phase.as_str(), "calling model");
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self.llm.complete(transcript.messages(), &catalog) => r,
            };
            stats.model_calls += 1;

            let completion = completion.map_err(|e| {
                tracing::warn!(error = %e, model_calls = stats.model_calls, "model gateway failure, aborting");
                AgentError::from(e)
            })?;

            let (content, calls) = match completion {
                Completion::ToolCalls { content, calls } if !calls.is_empty() => (content, calls),
                Completion::ToolCalls { content, .. } | Completion::Answer(content) => {
                    phase = LoopPhase::Answered;
                    let content = if content.trim().is_empty() {
                        EMPTY_ANSWER_FALLBACK.to_string()
                    } else {
                        content
                    };
                    transcript.push(Message::assistant(content.clone()));
                    let (cur_prompt, cur_completion, _) = self.llm.token_usage();
                    tracing::info!(
                        model_calls = stats.model_calls,
                        tool_calls = stats.tool_calls,
                        mutations = stats.mutations_applied,
                        prompt_tokens = cur_prompt.saturating_sub(init_prompt),
                        completion_tokens = cur_completion.saturating_sub(init_completion),
                        phase = phase.as_str(),
                        "request answered"
                    );
                    return Ok(FinalAnswer {
                        content,
                        outcome: Outcome::Answered,
                        stats: *stats,
                        transcript: transcript.into_messages(),
                    });
                }
            };

            phase = LoopPhase::ExecutingTools;
            tracing::debug!(count = calls.len(), phase = phase.as_str(), "executing tool calls");
            transcript.push(Message::assistant_tool_calls(content, calls.clone()));

            // 同一轮内按模型给出的顺序串行执行
            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let result = self.executor.execute(call, &mut guard).await;
                stats.tool_calls += 1;
                if result.may_have_applied() && self.executor.is_mutation(&call.name) {
                    stats.mutations_applied += 1;
                }
                transcript.push(result.to_message());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{answer, tool_calls};
    use crate::llm::ScriptedLlmClient;
    use crate::store::InMemoryEntityStore;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn build(llm: Arc<ScriptedLlmClient>, max_iterations: usize) -> Orchestrator {
        let store = Arc::new(InMemoryEntityStore::new());
        let executor = Arc::new(ToolExecutor::new(ToolRegistry::directory(store, 20), 5));
        Orchestrator::new(
            llm,
            executor,
            "prompt",
            OrchestratorConfig {
                max_iterations,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_zero_iterations_clamped() {
        let orch = build(Arc::new(ScriptedLlmClient::new(vec![])), 0);
        assert_eq!(orch.max_iterations(), 1);
        assert_eq!(orch.system_prompt(), "prompt");
    }

    #[tokio::test]
    async fn test_direct_answer_single_call() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![answer("Bonjour")]));
        let orch = build(llm.clone(), 4);
        let result = orch.run(vec![Message::user("Salut")]).await.unwrap();
        assert_eq!(result.content, "Bonjour");
        assert_eq!(result.outcome, Outcome::Answered);
        assert_eq!(result.stats.model_calls, 1);
        assert_eq!(result.stats.tool_calls, 0);
        // system + user + assistant
        assert_eq!(result.transcript.len(), 3);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_iteration_never_runs_tools_twice() {
        let llm = Arc::new(ScriptedLlmClient::repeating(tool_calls(vec![(
            "c1",
            "search_directory",
            json!({"query": "x"}),
        )])));
        let orch = build(llm.clone(), 1);
        let result = orch.run(vec![Message::user("x")]).await.unwrap();
        assert!(result.is_exhausted());
        assert_eq!(result.stats.tool_calls, 1);
        assert_eq!(llm.call_count(), 1);
    }
}
