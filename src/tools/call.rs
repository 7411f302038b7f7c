//! 工具调用与结果的数据模型
//!
//! ToolCall 由 LLM 请求产生，ToolResult 回答某个 ToolCall（按 id 关联）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::ImageRef;

/// 工具的调度方式：同步（当场返回结果）或异步（结果由外部事件经 CorrelationRegistry 送达）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    #[default]
    Sync,
    Async,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Sync => f.write_str("sync"),
            DispatchMode::Async => f.write_str("async"),
        }
    }
}

/// 模型请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 单次调用唯一 id（异步工具以此作为 correlation id）
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// 由调度器按工具目录填写；模型返回时默认为 Sync
    #[serde(default)]
    pub mode: DispatchMode,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            mode: DispatchMode::Sync,
        }
    }
}

/// 工具调用结果：成功 payload 或错误描述，可附带截图
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            success: true,
            content: content.into(),
            image: None,
        }
    }

    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            success: false,
            content: error.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    /// 单行摘要，用于 Processing 状态文本
    pub fn summary(&self) -> String {
        if self.success {
            format!("{} done", self.tool)
        } else {
            format!("{} failed: {}", self.tool, preview(&self.content, 80))
        }
    }
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
