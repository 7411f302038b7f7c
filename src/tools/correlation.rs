//! 异步工具结果关联表
//!
//! 异步工具派发时以调用 id 注册一个一次性结果槽（oneshot），外部事件源（另一个应用返回、系统回调）
//! 可在任意线程调用 resolve / resolve_error 完成它。一把 Mutex 保护整张表；
//! 重复完成、完成未知 id、完成已取消 id 都只记为 Miss，不会报错。

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// 外部事件送达的结果：Ok(payload) 或 Err(错误描述)
pub type SlotResult = Result<String, String>;

/// 注册失败：同一 id 重复注册属于编程错误
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Correlation id already registered: {0}")]
    Duplicate(String),
}

/// resolve 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 已送达等待方
    Delivered,
    /// id 不存在（从未注册、已完成或已取消），忽略
    Miss,
}

/// 等待中的结果槽；等待方被丢弃时 resolve 仍返回 Delivered（条目已移除）
#[derive(Debug)]
pub struct PendingSlot {
    id: String,
    rx: oneshot::Receiver<SlotResult>,
}

impl PendingSlot {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// 条目被 cancel 后发送端被丢弃，等待方得到 Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCancelled;

impl Future for PendingSlot {
    type Output = Result<SlotResult, SlotCancelled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| SlotCancelled))
    }
}

/// CorrelationRegistry：call id -> 待完成的结果槽
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    entries: Mutex<HashMap<String, oneshot::Sender<SlotResult>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<SlotResult>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, id: &str) -> Result<PendingSlot, RegistryError> {
        let mut entries = self.entries();
        if entries.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(id.to_string(), tx);
        tracing::debug!(call_id = %id, "Correlation registered");
        Ok(PendingSlot {
            id: id.to_string(),
            rx,
        })
    }

    pub fn resolve(&self, id: &str, result: impl Into<String>) -> Resolution {
        self.complete(id, Ok(result.into()))
    }

    pub fn resolve_error(&self, id: &str, error: impl Into<String>) -> Resolution {
        self.complete(id, Err(error.into()))
    }

    fn complete(&self, id: &str, result: SlotResult) -> Resolution {
        let sender = self.entries().remove(id);
        match sender {
            Some(tx) => {
                if tx.send(result).is_err() {
                    tracing::debug!(call_id = %id, "Correlation resolved after waiter went away");
                }
                Resolution::Delivered
            }
            None => {
                tracing::warn!(call_id = %id, "Resolution for unknown or finished correlation ignored");
                Resolution::Miss
            }
        }
    }

    /// 移除条目但不完成；之后的外部 resolve 为 Miss
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.entries().remove(id).is_some();
        if removed {
            tracing::debug!(call_id = %id, "Correlation cancelled");
        }
        removed
    }

    /// 取消全部条目（宿主组件销毁时），返回取消数量
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<String> = self.entries().drain().map(|(id, _)| id).collect();
        for id in &drained {
            tracing::debug!(call_id = %id, "Correlation cancelled");
        }
        drained.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries().len()
    }
}
