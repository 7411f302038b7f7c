//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：工具级错误回灌给模型继续循环，其余错误终止本轮。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::StoreError;

/// 编排器边界上的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 已有一轮在进行中；新命令被直接拒绝，不修改任何状态
    #[error("Agent is busy with another command")]
    Busy,

    /// 模型调用失败（鉴权 / 网络 / API），本轮终止，会话保持打开
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 异步工具在限定时间内未收到结果
    #[error("Tool {tool} did not report back within {waited_secs}s (call {call_id})")]
    AsyncTimeout {
        tool: String,
        call_id: String,
        waited_secs: u64,
    },

    /// 防失控：模型调用次数达到上限
    #[error("Turn limit of {0} model calls reached")]
    TurnLimitExceeded(usize),

    /// 持有 Agent 的组件已销毁
    #[error("Agent was destroyed")]
    Cancelled,

    #[error("Conversation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 工具级错误不终止本轮，而是作为工具结果回灌给模型
    pub fn is_tool_level(&self) -> bool {
        matches!(self, AgentError::ToolNotFound(_) | AgentError::ToolExecutionFailed(_))
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 把错误文本作为工具结果交给模型，继续循环
    FeedBackToModel(String),
    /// 终止当前轮，文本用于 Error 状态
    Abort(String),
}
