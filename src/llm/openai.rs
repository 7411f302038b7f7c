//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 直接调用 chat/completions（可配置 base_url），原生 function calling；
//! 图片以 image_url 内容片段发送。工具消息不能带图，截图会追加为紧随其后的一条 user 消息。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::LlmSection;
use crate::llm::{LlmClient, LlmError, ModelRequest, ModelResponse};
use crate::memory::{ImageRef, Message, Role};
use crate::tools::{ToolCall, ToolSpec};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            usage: TokenUsage::new(),
        })
    }

    /// 从 [llm] 配置构造；API Key 从 api_key_env 指定的环境变量读取
    pub fn from_config(cfg: &LlmSection) -> Result<Self, LlmError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            LlmError::Authentication(format!("Environment variable {} not set", cfg.api_key_env))
        })?;
        Self::new(
            cfg.base_url.as_deref(),
            &cfg.model,
            api_key,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    fn build_request_body(&self, request: &ModelRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        for m in &request.messages {
            convert_message(m, &mut messages);
        }
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(tool_declaration).collect());
        }
        body
    }

    fn parse_response(&self, response: ChatResponse) -> Result<ModelResponse, LlmError> {
        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = match serde_json::from_str::<Value>(&tc.function.arguments) {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        tracing::warn!(tool = %tc.function.name, "Tool arguments are not a JSON object");
                        Map::new()
                    }
                };
                ToolCall::new(tc.id.unwrap_or_default(), tc.function.name, arguments)
            })
            .collect();

        Ok(ModelResponse::from_parts(
            choice.message.content.unwrap_or_default(),
            calls,
        ))
    }
}

fn tool_declaration(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

fn image_part(image: &ImageRef) -> Value {
    json!({ "type": "image_url", "image_url": { "url": image.uri } })
}

/// 单条内部消息可能展开为多条 API 消息（工具截图）
fn convert_message(m: &Message, out: &mut Vec<Value>) {
    match m.role {
        Role::User => {
            let content = match &m.image {
                Some(image) => json!([{ "type": "text", "text": m.content }, image_part(image)]),
                None => json!(m.content),
            };
            out.push(json!({ "role": "user", "content": content }));
        }
        Role::Assistant => {
            let mut msg = json!({ "role": "assistant", "content": m.content });
            if !m.tool_calls.is_empty() {
                msg["tool_calls"] = Value::Array(
                    m.tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": Value::Object(tc.arguments.clone()).to_string(),
                                }
                            })
                        })
                        .collect(),
                );
            }
            out.push(msg);
        }
        Role::Tool => {
            out.push(json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id,
                "content": m.content,
            }));
            if let Some(image) = &m.image {
                out.push(json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Screenshot returned by the previous tool call." },
                        image_part(image),
                    ]
                }));
            }
        }
    }
}

fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    parse_retry_after(response.headers().get(reqwest::header::RETRY_AFTER)?.to_str().ok()?)
}

/// Retry-After 秒数转毫秒；HTTP 日期格式不支持，返回 None
fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let body = self.build_request_body(request);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(&response);
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(message),
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                    retry_after_ms: retry_after,
                },
                _ => LlmError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        self.parse_response(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: Option<String>,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
