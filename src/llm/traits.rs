//! LLM 客户端抽象
//!
//! 请求 = 系统提示 + 完整对话 + 静态工具目录；响应 = 最终文本，或一个及以上工具调用。
//! 所有后端（OpenAI 兼容 / Scripted / Mock）实现 LlmClient。

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::{ToolCall, ToolSpec};

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 仅网络错误与限流值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// 一次模型请求
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

/// 模型响应
#[derive(Clone, Debug, PartialEq)]
pub enum ModelResponse {
    /// 最终回答，本轮结束
    Text(String),
    /// 请求执行工具；text 为模型随附的说明（可为空）
    ToolCalls { text: String, calls: Vec<ToolCall> },
}

impl ModelResponse {
    /// 无工具调用时视为最终文本
    pub fn from_parts(text: String, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            ModelResponse::Text(text)
        } else {
            ModelResponse::ToolCalls { text, calls }
        }
    }
}

/// 为缺失或重复的调用 id 生成新的 UUID，保证同一响应内 id 唯一
pub fn ensure_unique_call_ids(calls: &mut [ToolCall]) {
    let mut seen = HashSet::new();
    for call in calls.iter_mut() {
        if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
            call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            seen.insert(call.id.clone());
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError>;

    fn model_name(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_missing_and_duplicate_ids_are_replaced() {
        let mut calls = vec![
            ToolCall::new("a", "tap", Map::new()),
            ToolCall::new("", "swipe", Map::new()),
            ToolCall::new("a", "press_key", Map::new()),
        ];
        ensure_unique_call_ids(&mut calls);
        assert_eq!(calls[0].id, "a");
        assert!(calls[1].id.starts_with("call_"));
        assert!(calls[2].id.starts_with("call_"));
        assert_ne!(calls[1].id, calls[2].id);
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            ModelResponse::from_parts("hi".into(), vec![]),
            ModelResponse::Text("hi".into())
        );
        assert!(matches!(
            ModelResponse::from_parts(String::new(), vec![ToolCall::new("a", "tap", Map::new())]),
            ModelResponse::ToolCalls { .. }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(LlmError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(!LlmError::Authentication("bad key".into()).is_retryable());
    }
}
