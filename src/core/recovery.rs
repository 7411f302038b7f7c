//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：工具级失败回灌给模型，模型不可用、超时、超限等终止本轮。

use crate::core::{AgentError, RecoveryAction};
use crate::llm::LlmError;

/// 语义化错误恢复：将错误映射为可执行动作与面向用户的状态文本
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        if err.is_tool_level() {
            RecoveryAction::FeedBackToModel(err.to_string())
        } else {
            RecoveryAction::Abort(self.status_text(err))
        }
    }

    /// Error 状态中展示给用户的文本
    pub fn status_text(&self, err: &AgentError) -> String {
        match err {
            AgentError::ModelUnavailable(LlmError::Authentication(_)) => {
                "The language model rejected the API key. Check your settings.".to_string()
            }
            AgentError::ModelUnavailable(LlmError::Network(_)) => {
                "Could not reach the language model. Check your connection and try again.".to_string()
            }
            AgentError::ModelUnavailable(LlmError::RateLimited { .. }) => {
                "The language model is rate limiting requests. Try again shortly.".to_string()
            }
            AgentError::ModelUnavailable(e) => format!("Language model error: {e}"),
            AgentError::AsyncTimeout { tool, .. } => {
                format!("Gave up waiting for {tool} to report back.")
            }
            AgentError::TurnLimitExceeded(n) => {
                format!("Stopped after {n} steps without finishing the task.")
            }
            other => other.to_string(),
        }
    }
}
