//! 对话模型与对话存储
//!
//! 每个 Conversation 是只追加的消息日志；ConversationStore 保存全部对话并维护「当前」对话指针。
//! 存储可被工作线程与外部回调（如组件销毁）同时访问，内部用一把 RwLock 保护。

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::ConversationPersistence;
use crate::tools::{ToolCall, ToolResult};

/// 列表标题的最大字符数
const TITLE_MAX_CHARS: usize = 48;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// 图片引用：content uri、文件路径或 data URL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ImageRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
        }
    }
}

/// 单条消息，追加后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    pub timestamp: DateTime<Utc>,
    /// assistant 消息请求的工具调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// tool 消息回答的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            image: None,
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn user_with_image(content: impl Into<String>, image: Option<ImageRef>) -> Self {
        Self {
            image,
            ..Self::user(content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// 模型请求工具调用时的 assistant 消息（content 可为空）
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::assistant(content)
        }
    }

    /// 工具结果消息；失败也作为文本回传，便于模型调整
    pub fn tool_result(result: &ToolResult) -> Self {
        let content = if result.success {
            result.content.clone()
        } else {
            format!("Error: {}", result.content)
        };
        Self {
            image: result.image.clone(),
            tool_call_id: Some(result.call_id.clone()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// 一次对话：id、按追加顺序排列的消息、开始时间、可空的结束时间
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Conversation {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// 列表展示用标题：首条用户消息（截断），没有则为 "New conversation"
    pub fn title(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| {
                let line = m.content.lines().next().unwrap_or("").trim();
                crate::tools::call::preview(line, TITLE_MAX_CHARS)
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "New conversation".to_string())
    }
}

/// 存储层错误
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation already ended: {0}")]
    AlreadyEnded(String),
}

#[derive(Debug, Default)]
struct StoreState {
    /// 按创建顺序保存
    conversations: Vec<Conversation>,
    current: Option<String>,
}

impl StoreState {
    fn find_mut(&mut self, id: &str) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn close_stale(&mut self, now: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for c in self.conversations.iter_mut().filter(|c| c.end_time.is_none()) {
            c.end_time = Some(now);
            closed += 1;
        }
        closed
    }
}

/// 对话存储：内存中的排序/顺序保证，可选 JSON 文件持久化（每次变更后写盘）
#[derive(Debug, Default)]
pub struct ConversationStore {
    state: RwLock<StoreState>,
    persistence: Option<ConversationPersistence>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化文件恢复；没有结束时间的对话视为上次进程遗留，以当前时间关闭
    pub fn with_persistence(persistence: ConversationPersistence) -> anyhow::Result<Self> {
        let conversations = persistence.load()?;
        let mut state = StoreState {
            conversations,
            current: None,
        };
        let closed = state.close_stale(Utc::now());
        if closed > 0 {
            tracing::info!("Closed {} abandoned conversations from previous run", closed);
        }
        let store = Self {
            state: RwLock::new(state),
            persistence: Some(persistence),
        };
        store.persist(&store.read());
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &StoreState) {
        if let Some(p) = &self.persistence {
            if let Err(e) = p.save(&state.conversations) {
                tracing::warn!("Failed to persist conversations: {}", e);
            }
        }
    }

    /// 新建对话并设为当前；旧的当前对话不会被隐式关闭
    pub fn start_conversation(&self) -> String {
        let mut state = self.write();
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        state.conversations.push(conversation);
        state.current = Some(id.clone());
        self.persist(&state);
        tracing::debug!(conversation = %id, "Conversation started");
        id
    }

    pub fn append_message(&self, id: &str, message: Message) -> Result<(), StoreError> {
        let mut state = self.write();
        let conversation = state.find_mut(id)?;
        if !conversation.is_open() {
            return Err(StoreError::AlreadyEnded(id.to_string()));
        }
        conversation.messages.push(message);
        self.persist(&state);
        Ok(())
    }

    pub fn end_conversation(&self, id: &str, time: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write();
        let conversation = state.find_mut(id)?;
        if !conversation.is_open() {
            return Err(StoreError::AlreadyEnded(id.to_string()));
        }
        conversation.end_time = Some(time);
        self.persist(&state);
        tracing::debug!(conversation = %id, "Conversation ended");
        Ok(())
    }

    /// 关闭所有未结束的对话，返回关闭数量
    pub fn close_stale(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.write();
        let closed = state.close_stale(now);
        if closed > 0 {
            self.persist(&state);
        }
        closed
    }

    /// 按开始时间倒序（最新在前）；消息顺序保持追加顺序
    pub fn list_conversations(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.read().conversations.iter().rev().cloned().collect();
        list.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        list
    }

    pub fn clear_all(&self) {
        let mut state = self.write();
        state.conversations.clear();
        state.current = None;
        self.persist(&state);
    }

    pub fn current_id(&self) -> Option<String> {
        self.read().current.clone()
    }

    /// 当前对话（可能已结束，调用方用 is_open 判断）
    pub fn current(&self) -> Option<Conversation> {
        let state = self.read();
        let id = state.current.as_deref()?;
        state.conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.read().conversations.iter().find(|c| c.id == id).cloned()
    }

    /// 供 LLM 请求使用的完整消息副本
    pub fn messages(&self, id: &str) -> Result<Vec<Message>, StoreError> {
        self.read()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.messages.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.read().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().conversations.is_empty()
    }
}
