//! Hive - 组织目录对话智能体（终端）
//!
//! 入口：初始化日志、按配置创建组件，逐行读取 stdin 作为用户消息并打印回答。
//! 会话历史（user / assistant）在进程内保留，`/reset` 清空，`/quit` 退出。

use anyhow::Context;
use hive::agent::{create_agent_components, process_chat, ChatMessage, ChatRequest};
use hive::config::{config_path_from_args, load_config};
use hive::memory::Role;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(config_path_from_args(std::env::args())).context("Failed to load config")?;
    let components = create_agent_components(&cfg).context("Failed to create agent")?;
    tracing::info!(
        provider = %cfg.llm.provider,
        store = %cfg.store.backend,
        max_iterations = cfg.agent.max_iterations,
        "hive ready"
    );

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                stdout.write_all("Conversation réinitialisée.\n".as_bytes()).await?;
                continue;
            }
            _ => {}
        }

        history.push(ChatMessage {
            role: Role::User,
            content: input.to_string(),
        });
        let request = ChatRequest {
            messages: history.clone(),
        };
        match process_chat(&components, request).await {
            Ok(response) => {
                stdout.write_all(format!("{}\n", response.content).as_bytes()).await?;
                history.push(ChatMessage {
                    role: Role::Assistant,
                    content: response.content,
                });
            }
            Err(failure) => {
                // 失败的提问不留在历史中
                history.pop();
                stdout
                    .write_all(format!("[{}] {}\n", failure.error, failure.message).as_bytes())
                    .await?;
            }
        }
    }

    Ok(())
}
