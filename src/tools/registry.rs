//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / mode / execute|start），
//! 由 ToolRegistry 按名注册与查找；注册顺序即暴露给 LLM 的目录顺序。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::memory::ImageRef;
use crate::tools::DispatchMode;

/// 同步工具的输出：文本 + 可选图片（截图）
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub image: Option<ImageRef>,
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self { text, image: None }
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

/// 工具 trait。同步工具实现 execute；异步工具返回 mode() == Async 并实现 start，
/// start 只负责发出请求，结果稍后经 CorrelationRegistry 以 correlation_id 送达。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（LLM function name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Sync
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
        Err(format!("{} must be dispatched asynchronously", self.name()))
    }

    async fn start(&self, _correlation_id: &str, _args: &Map<String, Value>) -> Result<(), String> {
        Err(format!("{} does not support asynchronous dispatch", self.name()))
    }
}

/// 目录条目：发给 LLM 的工具声明
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub mode: DispatchMode,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者覆盖先注册者，目录位置不变
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// 静态工具目录（注册顺序）
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                mode: tool.mode(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
