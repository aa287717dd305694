//! 会话持久化
//!
//! 按 session id 将对话历史写入/读出 JSON 文件（纯 load/save 对，核心不关心
//! 存储细节）。文件名 `<sessions_dir>/<session_id>.json`。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::memory::{ConversationTurn, Role};

/// 按会话存取对话历史的文件存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// 加载指定会话的历史；文件不存在时返回空 Vec
    pub fn load(&self, session_id: Uuid) -> anyhow::Result<Vec<ConversationTurn>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let turns: Vec<SerTurn> = serde_json::from_str(&data)?;
        Ok(turns
            .into_iter()
            .map(|t| ConversationTurn {
                role: match t.role.as_str() {
                    "user" => Role::User,
                    "tool" => Role::Tool,
                    _ => Role::Agent,
                },
                content: t.content,
                timestamp: t
                    .timestamp
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    /// 写入指定会话的历史；父目录不存在时自动创建
    pub fn save(&self, session_id: Uuid, turns: &[ConversationTurn]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let ser: Vec<SerTurn> = turns
            .iter()
            .map(|t| SerTurn {
                role: t.role.as_str().to_string(),
                content: t.content.clone(),
                timestamp: t.timestamp.to_rfc3339(),
            })
            .collect();
        std::fs::write(self.path_for(session_id), serde_json::to_string_pretty(&ser)?)?;
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerTurn {
    role: String,
    content: String,
    timestamp: String,
}
