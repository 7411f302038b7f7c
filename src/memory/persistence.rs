//! 对话持久化
//!
//! 将全部对话写入/从单个 JSON 文件加载，消息顺序与内容无损往返。

use std::path::{Path, PathBuf};

use crate::memory::Conversation;

/// 简单的文件持久化：单文件 JSON，保存 Conversation 列表
#[derive(Debug, Clone)]
pub struct ConversationPersistence {
    path: PathBuf,
}

impl ConversationPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 数据目录下的默认文件名
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("conversations.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<Conversation>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 先写临时文件再 rename，避免写到一半崩溃留下半截 JSON；父目录不存在时自动创建
    pub fn save(&self, conversations: &[Conversation]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(conversations)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
