//! LLM 层：模型网关抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::ScriptedLlmClient;
pub use openai::{classify_status, OpenAiClient, TokenUsage, OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL};
pub use traits::{Completion, LlmClient, LlmError, ToolSpec};
