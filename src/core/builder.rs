//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! 由配置、设备能力与可选的 LLM / 关联表 / 对话存储组装出一个 Agent。
//! 调用方持有返回的 Arc<Agent> 并显式传给需要它的组件，没有全局单例。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::config::AppConfig;
use crate::core::orchestrator::DEFAULT_SYSTEM_PROMPT;
use crate::core::{Agent, AgentError, RecoveryEngine, SessionSupervisor, StatusBroadcaster, TurnPhase};
use crate::device::Capabilities;
use crate::llm::{create_client_from_config, LlmClient};
use crate::memory::{ConversationPersistence, ConversationStore};
use crate::tools::{register_builtin_tools, CorrelationRegistry, Tool, ToolDispatcher, ToolRegistry};

pub struct AgentBuilder {
    config: AppConfig,
    capabilities: Option<Capabilities>,
    llm: Option<Arc<dyn LlmClient>>,
    correlations: Option<Arc<CorrelationRegistry>>,
    store: Option<Arc<ConversationStore>>,
    extra_tools: Vec<Arc<dyn Tool>>,
    system_prompt: Option<String>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            capabilities: None,
            llm: None,
            correlations: None,
            store: None,
            extra_tools: Vec::new(),
            system_prompt: None,
        }
    }

    /// 设备能力（必需）
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// 未设置时按 [llm] 配置创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 与外部事件源共享的关联表
    pub fn with_correlations(mut self, correlations: Arc<CorrelationRegistry>) -> Self {
        self.correlations = Some(correlations);
        self
    }

    /// 未设置时：配置了 data_dir 则持久化到 conversations.json，否则仅内存
    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 内置工具之外的工具；同名时覆盖内置工具
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 显式设置 > system_prompt_path 文件 > 内置提示
    fn resolve_system_prompt(&self) -> String {
        if let Some(prompt) = &self.system_prompt {
            return prompt.clone();
        }
        if let Some(path) = &self.config.app.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(prompt) if !prompt.trim().is_empty() => return prompt,
                Ok(_) => tracing::warn!("System prompt file {} is empty", path.display()),
                Err(e) => tracing::warn!("Failed to read system prompt {}: {}", path.display(), e),
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }

    fn build_store(&self) -> Result<Arc<ConversationStore>, AgentError> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        match &self.config.app.data_dir {
            Some(dir) => ConversationStore::with_persistence(ConversationPersistence::in_dir(dir))
                .map(Arc::new)
                .map_err(|e| AgentError::Config(format!("{e:#}"))),
            None => Ok(Arc::new(ConversationStore::new())),
        }
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let capabilities = self
            .capabilities
            .clone()
            .ok_or_else(|| AgentError::Config("No capability providers configured".to_string()))?;
        let agent_cfg = &self.config.agent;
        if agent_cfg.max_turns == 0 {
            return Err(AgentError::Config("agent.max_turns must be at least 1".to_string()));
        }

        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools, &capabilities);
        for tool in &self.extra_tools {
            tools.register_arc(tool.clone());
        }

        let correlations = self
            .correlations
            .clone()
            .unwrap_or_else(|| Arc::new(CorrelationRegistry::new()));
        let dispatcher = ToolDispatcher::new(
            tools,
            correlations,
            Duration::from_secs(agent_cfg.tool_timeout_secs),
            Duration::from_secs(agent_cfg.async_tool_timeout_secs),
        );
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_client_from_config(&self.config.llm));
        let store = self.build_store()?;
        let (phase_tx, _) = watch::channel(TurnPhase::Idle);

        tracing::info!(
            model = %llm.model_name(),
            tools = dispatcher.tool_names().len(),
            "Agent built"
        );

        Ok(Agent {
            llm,
            dispatcher,
            store,
            status: Arc::new(StatusBroadcaster::new()),
            recovery: RecoveryEngine::new(),
            supervisor: SessionSupervisor::new(),
            phase_tx,
            turn_guard: Mutex::new(()),
            system_prompt: self.resolve_system_prompt(),
            max_turns: agent_cfg.max_turns,
            triggers: self.config.triggers.clone(),
        })
    }
}

/// 便捷函数：从默认路径加载配置并创建 AgentBuilder
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    AgentBuilder::new(config)
}
