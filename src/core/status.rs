//! 状态广播：单槽监听器，后注册者覆盖先注册者
//!
//! 任何想接收进度的界面在激活时调用 set_listener，并自行保存返回的旧监听器以便停用后恢复。
//! emit 在锁内取出当前监听器、在锁外同步调用；无监听器时静默丢弃。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::core::AgentStatus;

pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: &AgentStatus);
}

impl<F> StatusListener for F
where
    F: Fn(&AgentStatus) + Send + Sync,
{
    fn on_status(&self, status: &AgentStatus) {
        self(status)
    }
}

/// 把状态转发到 mpsc 通道（接收端被丢弃后静默忽略）
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<AgentStatus>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusListener for ChannelListener {
    fn on_status(&self, status: &AgentStatus) {
        let _ = self.tx.send(status.clone());
    }
}

#[derive(Default)]
pub struct StatusBroadcaster {
    listener: Mutex<Option<Arc<dyn StatusListener>>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn StatusListener>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 替换当前监听器，返回被替换者
    pub fn set_listener(&self, listener: Arc<dyn StatusListener>) -> Option<Arc<dyn StatusListener>> {
        self.slot().replace(listener)
    }

    pub fn clear_listener(&self) -> Option<Arc<dyn StatusListener>> {
        self.slot().take()
    }

    pub fn has_listener(&self) -> bool {
        self.slot().is_some()
    }

    pub fn emit(&self, status: AgentStatus) {
        let listener = self.slot().clone();
        match listener {
            Some(listener) => listener.on_status(&status),
            None => tracing::trace!(status = %status, "Status dropped, no listener"),
        }
    }
}
