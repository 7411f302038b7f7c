//! Gosling - 移动端自动化助手
//!
//! 自然语言命令经 LLM 多轮工具调用，转化为对设备的一系列操作（读屏、截屏、点击、输入、启动应用、处理通知）。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 主控循环、错误与恢复、状态广播、阶段投影、会话监管、构建器、触发器
//! - **device**: 设备能力 trait、已安装应用分类、内存模拟设备
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 重试 / Scripted / Mock）
//! - **memory**: 对话模型、对话存储与 JSON 持久化
//! - **observability**: tracing 初始化
//! - **tools**: 工具注册表、异步结果关联表、调度器与内置移动端工具

pub mod config;
pub mod core;
pub mod device;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{Agent, AgentBuilder, AgentError, AgentStatus, TriggerType};
