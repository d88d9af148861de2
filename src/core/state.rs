//! 编排状态：循环阶段、结束方式与运行统计
//!
//! Start → AwaitingModel → {Answered | ExecutingTools → AwaitingModel}，达到上限时 → Exhausted。

use serde::Serialize;

use crate::memory::Message;

/// 循环阶段（日志与调试用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoopPhase {
    Start,
    AwaitingModel,
    ExecutingTools,
    Answered,
    Exhausted,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Start => "start",
            LoopPhase::AwaitingModel => "awaiting_model",
            LoopPhase::ExecutingTools => "executing_tools",
            LoopPhase::Answered => "answered",
            LoopPhase::Exhausted => "exhausted",
        }
    }
}

/// 正常结束的方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// 模型给出了最终回答
    Answered,
    /// 达到迭代上限，返回降级回答
    Exhausted,
}

/// 一次运行的计数，失败时调用方据此判断能否安全重试
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub model_calls: usize,
    pub tool_calls: usize,
    /// 已落库或超时后结果未知的变更次数
    pub mutations_applied: usize,
}

/// 编排结果
#[derive(Clone, Debug)]
pub struct FinalAnswer {
    pub content: String,
    pub outcome: Outcome,
    pub stats: RunStats,
    /// 完整 transcript（含 system / tool 消息）
    pub transcript: Vec<Message>,
}

impl FinalAnswer {
    pub fn is_exhausted(&self) -> bool {
        self.outcome == Outcome::Exhausted
    }
}
