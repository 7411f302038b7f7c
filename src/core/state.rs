//! 状态定义：AgentStatus 进度事件、触发类型、TurnPhase 投影
//!
//! AgentStatus 只广播不持久化；TurnPhase 经 watch 通道投影，观察者随时可读最新阶段。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 一次进度事件
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AgentStatus {
    Processing(String),
    Success(String),
    Error(String),
}

impl AgentStatus {
    pub fn message(&self) -> &str {
        match self {
            AgentStatus::Processing(m) | AgentStatus::Success(m) | AgentStatus::Error(m) => m,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentStatus::Processing(_))
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Processing(m) => write!(f, "[processing] {m}"),
            AgentStatus::Success(m) => write!(f, "[success] {m}"),
            AgentStatus::Error(m) => write!(f, "[error] {m}"),
        }
    }
}

/// 本轮的起因；只影响日志与系统提示中的一行策略，不改变控制流
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Command,
    Notification,
    Screenshot,
}

impl TriggerType {
    pub fn policy_line(&self) -> &'static str {
        match self {
            TriggerType::Command => {
                "The user typed this request directly. Carry it out, then answer briefly."
            }
            TriggerType::Notification => {
                "This turn was started by an incoming notification, not by the user. \
                 Only act when the notification clearly needs handling; otherwise reply with a one-line summary."
            }
            TriggerType::Screenshot => {
                "The user just took the attached screenshot. Follow their screenshot preferences; \
                 do not perform actions they did not ask for."
            }
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Command => f.write_str("command"),
            TriggerType::Notification => f.write_str("notification"),
            TriggerType::Screenshot => f.write_str("screenshot"),
        }
    }
}

/// 本轮结局
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Success,
    Error,
    Cancelled,
}

/// 轮次状态机：Idle → Dispatched → Executing → Dispatched → … → Terminal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    /// 等待模型响应；iteration 从 1 开始
    Dispatched { iteration: usize },
    /// 等待工具结果
    Executing { tool: String, call_id: String },
    Terminal { outcome: TurnOutcome },
}

impl TurnPhase {
    /// 是否有一轮正在进行
    pub fn is_active(&self) -> bool {
        matches!(self, TurnPhase::Dispatched { .. } | TurnPhase::Executing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_tagged_union() {
        let json = serde_json::to_value(AgentStatus::Processing("Thinking...".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "processing", "message": "Thinking..."}));
        assert!(AgentStatus::Error("x".into()).is_terminal());
        assert!(!AgentStatus::Processing("x".into()).is_terminal());
    }

    #[test]
    fn test_phase_activity() {
        assert!(!TurnPhase::Idle.is_active());
        assert!(TurnPhase::Dispatched { iteration: 1 }.is_active());
        assert!(!TurnPhase::Terminal { outcome: TurnOutcome::Success }.is_active());
    }
}
