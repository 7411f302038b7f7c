//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GOSLING__*` 覆盖（双下划线表示嵌套，如 `GOSLING__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub triggers: TriggersSection,
}

/// [app] 段：应用名、数据目录、系统提示覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// conversations.json 所在目录；未设置时只保存在内存
    pub data_dir: Option<PathBuf>,
    /// 覆盖内置系统提示的文件
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Gosling".to_string(),
            data_dir: None,
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// 单次重试等待上限（含服务端 Retry-After）
    pub retry_max_delay_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
        }
    }
}

/// [agent] 段：轮次上限与工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单轮内模型调用次数上限（防失控）
    pub max_turns: usize,
    /// 同步工具单次执行超时（秒）
    pub tool_timeout_secs: u64,
    /// 异步工具等待外部结果的超时（秒）
    pub async_tool_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_turns: 20,
            tool_timeout_secs: 30,
            async_tool_timeout_secs: 30,
        }
    }
}

/// [triggers] 段：通知与截屏触发
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    pub process_notifications: bool,
    /// 不处理其通知的包名（本应用自身总是忽略）
    pub ignored_packages: Vec<String>,
    pub handle_screenshots: bool,
    /// 用户对截屏处理的偏好（自由文本）
    pub screenshot_preferences: String,
}

/// 从 config 目录加载配置，环境变量 GOSLING__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GOSLING__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("GOSLING")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("triggers.ignored_packages")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
