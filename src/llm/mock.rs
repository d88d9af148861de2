//! 脚本化 LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预先排好的 Completion / LlmError；脚本用完后返回 repeat 步骤（若有）
//! 或返回 Unavailable。每次调用收到的 transcript 都会被记录，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Completion, LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, Role, ToolCall};

pub type Step = Result<Completion, LlmError>;

/// 脚本化客户端
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Step>>,
    /// 脚本耗尽后不断重复的一步
    repeat: Option<Step>,
    /// 无脚本时走离线搜索回显
    offline: bool,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            repeat: None,
            offline: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都返回同一步
    pub fn repeating(step: Step) -> Self {
        Self {
            repeat: Some(step),
            ..Self::default()
        }
    }

    /// 离线演示：对最后一条用户消息先搜索，再复述搜索结果
    pub fn echo_search() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// 已收到的调用次数
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 各次调用收到的 transcript
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> Option<Step> {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        scripted.or_else(|| self.repeat.clone())
    }
}

/// 构造一个工具调用步骤
pub fn tool_calls(calls: Vec<(&str, &str, Value)>) -> Step {
    Ok(Completion::ToolCalls {
        content: String::new(),
        calls: calls
            .into_iter()
            .map(|(id, name, args)| ToolCall::new(id, name, args))
            .collect(),
    })
}

/// 构造一个最终回答步骤
pub fn answer(text: &str) -> Step {
    Ok(Completion::Answer(text.to_string()))
}

/// 没有脚本时的离线行为：首轮搜索用户的话，拿到结果后给出概要
fn offline_reply(messages: &[Message]) -> Completion {
    if let Some(last_tool) = messages.last().filter(|m| m.role == Role::Tool) {
        return Completion::Answer(format!("Résultat de la recherche : {}", last_tool.content));
    }
    let query = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    Completion::ToolCalls {
        content: String::new(),
        calls: vec![ToolCall::new(
            "call_offline_1",
            "search_directory",
            serde_json::json!({ "query": query }),
        )],
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSpec]) -> Result<Completion, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        match self.next_step() {
            Some(step) => step,
            None if self.offline => Ok(offline_reply(messages)),
            None => Err(LlmError::Unavailable("script exhausted".to_string())),
        }
    }
}
