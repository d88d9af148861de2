//! 工具结果：每个 ToolCall 恰好对应一个 ToolResult（失败也不丢弃）
//!
//! 失败以结构化负载回传模型，让模型自行修正（重新搜索、询问用户等）。

use serde_json::{json, Value};
use thiserror::Error;

use crate::memory::Message;
use crate::store::StoreError;
use crate::tools::schema::SchemaViolation;

/// 标识符校验失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    /// 不是合法标识符
    Malformed,
    /// 合法但本次会话中没有任何搜索结果返回过它
    Unverified,
}

impl VerificationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationFailure::Malformed => "malformed",
            VerificationFailure::Unverified => "unverified",
        }
    }
}

/// 可在循环内恢复的工具错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments for {tool}: {violation}")]
    SchemaValidation {
        tool: String,
        violation: SchemaViolation,
    },

    #[error("identifier '{value}' in '{field}' is {}", .reason.as_str())]
    Verification {
        field: String,
        value: String,
        reason: VerificationFailure,
    },

    #[error("entity {0} not found")]
    StoreNotFound(String),

    #[error("store constraint violated: {0}")]
    StoreConstraint(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// 变更调用超时：写入可能已在后台完成
    #[error("outcome unknown: {0}")]
    OutcomeUnknown(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::SchemaValidation { .. } => "schema_validation_error",
            ToolError::Verification { .. } => "verification_error",
            ToolError::StoreNotFound(_) => "store_not_found_error",
            ToolError::StoreConstraint(_) => "store_constraint_error",
            ToolError::StoreUnavailable(_) => "store_unavailable_error",
            ToolError::OutcomeUnknown(_) => "store_outcome_unknown_error",
            ToolError::UnknownTool(_) => "unknown_tool",
        }
    }

    /// 给模型的下一步提示
    pub fn hint(&self) -> &'static str {
        match self {
            ToolError::SchemaValidation { .. } => {
                "Fix the arguments to match the tool's parameter schema and call it again."
            }
            ToolError::Verification { .. } => {
                "Call search_directory with the entity's name first, then reuse an id returned by that search in this conversation. Never invent identifiers."
            }
            ToolError::StoreNotFound(_) => {
                "The entity no longer exists. Search again or ask the user for clarification."
            }
            ToolError::StoreConstraint(_) => {
                "The change conflicts with existing directory data. Explain the conflict to the user."
            }
            ToolError::StoreUnavailable(_) => {
                "The directory is temporarily unavailable. Tell the user the change was not applied."
            }
            ToolError::OutcomeUnknown(_) => {
                "The change may have been applied. Call search_directory to check before trying again, and tell the user the result is uncertain."
            }
            ToolError::UnknownTool(_) => "Use only the tools listed in the catalog.",
        }
    }

    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "hint": self.hint(),
        });
        if let ToolError::Verification { reason, .. } = self {
            error["reason"] = Value::String(reason.as_str().to_string());
        }
        json!({ "ok": false, "error": error })
    }
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ToolError::StoreNotFound(id.to_string()),
            StoreError::Constraint(msg) => ToolError::StoreConstraint(msg),
            StoreError::Unavailable(msg) => ToolError::StoreUnavailable(msg),
        }
    }
}

/// 单次工具调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub payload: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.payload.is_err()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.payload.as_ref().err()
    }

    /// 成功，或超时后结果未知：对变更类调用都按「可能已写入」计
    pub fn may_have_applied(&self) -> bool {
        matches!(self.payload, Ok(_) | Err(ToolError::OutcomeUnknown(_)))
    }

    /// 渲染为 tool 消息：成功 {"ok": true, ...}，失败 {"ok": false, "error": {...}}
    pub fn to_message(&self) -> Message {
        let body = match &self.payload {
            Ok(Value::Object(map)) => {
                let mut out = serde_json::Map::with_capacity(map.len() + 1);
                out.insert("ok".to_string(), Value::Bool(true));
                out.extend(map.clone());
                Value::Object(out)
            }
            Ok(other) => json!({ "ok": true, "result": other }),
            Err(e) => e.to_payload(),
        };
        Message::tool(self.tool_call_id.clone(), body.to_string())
    }
}
