//! Hive HTTP 入口
//!
//! 启动: cargo run --bin hive-web --features web [-- config.toml]
//! POST /api/chat  {"messages":[{"role":"user","content":"..."}]} → 200 {"content":"..."} 或错误状态 + ChatFailure
//! GET  /health

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use hive::agent::{create_agent_components, process_chat, AgentComponents, ChatFailure, ChatRequest, ChatResponse};
use hive::config::{config_path_from_args, load_config};

/// ChatFailure.error → HTTP 状态
fn status_for(failure: &ChatFailure) -> StatusCode {
    match failure.error.as_str() {
        "gateway_rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "gateway_quota_exhausted" | "gateway_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        "empty_transcript" => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn api_chat(
    State(components): State<Arc<AgentComponents>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatFailure>)> {
    tracing::info!(messages = req.messages.len(), "chat request");
    process_chat(&components, req)
        .await
        .map(Json)
        .map_err(|failure| (status_for(&failure), Json(failure)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cfg = load_config(config_path_from_args(std::env::args())).context("Failed to load config")?;
    let components = Arc::new(create_agent_components(&cfg).context("Failed to create agent")?);

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/health", get(|| async { "OK" }))
        .with_state(components);

    let port = std::env::var("HIVE_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Hive HTTP API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
