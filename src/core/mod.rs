//! 核心编排层：错误与恢复、状态与阶段投影、状态广播、会话监管、构建器、主控循环、触发器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod status;
pub mod triggers;

pub use builder::{create_agent_builder, AgentBuilder};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{Agent, DEFAULT_SYSTEM_PROMPT, THINKING};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{AgentStatus, TriggerType, TurnOutcome, TurnPhase};
pub use status::{ChannelListener, StatusBroadcaster, StatusListener};
pub use triggers::AGENT_PACKAGE;
