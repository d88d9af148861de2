//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute(call, guard) 依次：查找工具、schema 校验、
//! 变更类调用经 VerificationGuard 校验标识符、在超时内执行、把成功结果交给守卫收集标识符。
//! 变更在独立任务中执行：等待超时后写入仍会完成，结果报告为 outcome unknown。
//! 任何失败都转为 ToolResult 错误负载（从不向上抛出）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::llm::ToolSpec;
use crate::memory::ToolCall;
use crate::tools::guard::VerificationGuard;
use crate::tools::registry::{ToolClass, ToolKind, ToolRegistry};
use crate::tools::result::{ToolError, ToolResult};

/// 工具执行器：每次调用恰好产出一个 ToolResult
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 执行一次工具调用；结果携带 call.id 以便归属
    pub async fn execute(&self, call: &ToolCall, guard: &mut VerificationGuard) -> ToolResult {
        let start = Instant::now();
        let payload = self.dispatch(call, guard).await;

        let result = ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            payload,
        };
        if let Some(kind) = ToolKind::from_name(&call.name) {
            guard.observe(kind, &result);
        }

        let outcome = match &result.payload {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": !result.is_error(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        guard: &VerificationGuard,
    ) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        tool.parameters_schema()
            .validate(&call.arguments)
            .map_err(|violation| ToolError::SchemaValidation {
                tool: call.name.clone(),
                violation,
            })?;

        if tool.kind().class() == ToolClass::Search {
            return match timeout(self.timeout, tool.execute(call.arguments.clone())).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::StoreUnavailable(format!(
                    "{} timed out after {}s",
                    call.name,
                    self.timeout.as_secs()
                ))),
            };
        }

        guard.authorize(tool.as_ref(), &call.arguments)?;

        // 写入在独立任务中跑完，超时只影响本次等待
        let args = call.arguments.clone();
        let write = tokio::spawn(async move { tool.execute(args).await });
        match timeout(self.timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ToolError::StoreUnavailable(format!("{} task failed: {e}", call.name))),
            Err(_) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    timeout_secs = self.timeout.as_secs(),
                    "mutation timed out, outcome unknown"
                );
                Err(ToolError::OutcomeUnknown(format!(
                    "{} timed out after {}s and may still complete",
                    call.name,
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// 该工具名是否为变更类
    pub fn is_mutation(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .map_or(false, |t| t.kind().class() == ToolClass::Mutation)
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
