//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=deepseek`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub store: StoreSection,
    pub web: WebSection,
}

/// [app] 段：应用名、系统指令文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 未设置时依次尝试 config/prompts/system.md、内置默认指令
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "hive".to_string(),
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：模型网关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    /// 未设置时用各后端自己的默认模型（gpt-4o-mini / deepseek-chat）
    pub model: Option<String>,
    /// 覆盖默认 base_url（自建代理等）
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY / DEEPSEEK_API_KEY
    pub api_key: Option<String>,
    /// 单次 HTTP 调用超时（秒）
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// [agent] 段：循环上限、请求截止时间、调用方重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单次请求最多调用模型的次数
    pub max_iterations: usize,
    pub request_timeout_secs: u64,
    /// 网关暂时性失败时整体重试的次数（仅当失败前没有变更落库）
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// 本次请求新建实体的标识符视为已校验
    pub trust_created_ids: bool,
    /// 覆盖达到上限时的降级回答
    pub exhausted_message: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            request_timeout_secs: 90,
            max_retries: 2,
            retry_base_delay_ms: 500,
            trust_created_ids: true,
            exhausted_message: None,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// search_directory 未给 limit 时的条数
    pub search_limit: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 10,
            search_limit: 20,
        }
    }
}

/// [store] 段：memory / sqlite
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: String,
    pub sqlite_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            sqlite_path: PathBuf::from("data/directory.db"),
        }
    }
}

/// [web] 段：hive-web 监听端口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 两个入口共用：第一个命令行参数为可选的配置文件路径
pub fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    args.into_iter()
        .nth(1)
        .filter(|a| !a.trim().is_empty())
        .map(PathBuf::from)
}
