//! 测试与离线用的 LLM 客户端（无需 API）
//!
//! - MockLlmClient：取最后一条 User 消息，回显为最终文本
//! - ScriptedLlmClient：按顺序回放预设响应，并记录收到的每个请求

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelRequest, ModelResponse};
use crate::memory::Role;

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ModelResponse::Text(format!("Echo from Mock: {last_user}")))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

type Scripted = Result<ModelResponse, LlmError>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    /// 脚本耗尽后重复返回的响应
    fallback: Option<Scripted>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次都返回同一响应（用于失控循环测试）
    pub fn repeating(response: Scripted) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(response) => response,
            None => Err(LlmError::InvalidResponse("No scripted response left".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
