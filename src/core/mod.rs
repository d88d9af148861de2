//! 核心编排层：主控循环、状态、系统指令、错误与恢复

pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod recovery;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use prompt::{load_system_prompt, DEFAULT_EXHAUSTED_MESSAGE, DEFAULT_SYSTEM_PROMPT};
pub use recovery::RecoveryEngine;
pub use state::{FinalAnswer, LoopPhase, Outcome, RunStats};
