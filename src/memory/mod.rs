//! 对话层：消息、工具调用与单次请求的对话记录

pub mod conversation;

pub use conversation::{Message, Role, ToolCall, Transcript};
