//! Hive - 组织目录对话智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（截止时间、调用方重试），供终端与 HTTP 入口调用
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排主循环、状态、系统指令、错误与恢复
//! - **llm**: 模型网关抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）
//! - **memory**: 消息、工具调用与单次请求的对话记录
//! - **store**: 实体存储（内存 / SQLite）
//! - **tools**: 目录工具、参数 schema、标识符校验守卫与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod store;
pub mod tools;

pub use agent::{process_chat, AgentComponents, ChatFailure, ChatMessage, ChatRequest, ChatResponse};
pub use core::{AgentError, FinalAnswer, Orchestrator, Outcome, RunStats};
