//! 短期记忆：对话历史
//!
//! MemoryManager 持有按时间追加的 ConversationTurn 序列，超出上限时 FIFO 淘汰
//! 最旧条目（对话相关性取决于新近度而非访问频率）。除 clear() 与 FIFO 淘汰外
//! 不发生任何静默丢失。每个并发会话持有独立实例，互不共享。

use chrono::{DateTime, Utc};

/// 对话角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::Tool => "tool",
        }
    }
}

/// 单条对话记录：角色 + 内容 + 时间戳
#[derive(Clone, Debug)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// 会话记忆：追加式、按时间有序、条数有界
#[derive(Clone, Debug)]
pub struct MemoryManager {
    turns: Vec<ConversationTurn>,
    max_turns: usize,
}

impl MemoryManager {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// 追加一条记录；超出上限时淘汰最旧条目
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let drop = self.turns.len() - self.max_turns;
            self.turns.drain(..drop);
        }
    }

    /// 最近 n 条记录，保持原始追加顺序
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 用已有记录重建（持久化恢复）；超出上限的旧记录同样被淘汰
    pub fn restore(&mut self, turns: Vec<ConversationTurn>) {
        self.turns.clear();
        for t in turns {
            self.append(t);
        }
    }
}

/// 将若干条记录渲染为 "ROLE: content" 文本段，供决策生成器与评审器的上下文使用
pub fn render_turns(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str().to_uppercase(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}
