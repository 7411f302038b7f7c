//! LLM 层：客户端抽象与实现（OpenAI 兼容 / 重试包装 / Scripted / Mock）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{ensure_unique_call_ids, LlmClient, LlmError, ModelRequest, ModelResponse};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端；provider = openai 但缺少 API Key 时退回 Mock
pub fn create_client_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.as_str() {
        "openai" => match OpenAiClient::from_config(cfg) {
            Ok(client) => {
                tracing::info!(model = %cfg.model, "Using OpenAI-compatible backend");
                Arc::new(RetryingLlmClient::new(
                    Arc::new(client),
                    RetryConfig {
                        max_retries: cfg.max_retries,
                        base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
                        max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
                    },
                ))
            }
            Err(e) => {
                tracing::warn!("{}; falling back to mock LLM", e);
                Arc::new(MockLlmClient)
            }
        },
        "mock" => Arc::new(MockLlmClient),
        other => {
            tracing::warn!("Unknown LLM provider '{}', using mock", other);
            Arc::new(MockLlmClient)
        }
    }
}
