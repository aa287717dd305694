//! 对话回忆工具
//!
//! recall_conversation：在当前会话的对话记忆里按关键词检索历史轮次。
//! 工具与会话共享同一个 MemoryManager（Arc<RwLock<...>>），不跨会话。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::memory::MemoryManager;
use crate::tools::Tool;

#[derive(Deserialize)]
struct RecallArgs {
    query: String,
}

/// 会话记忆检索工具（只读，绑定当前会话）
pub struct RecallTool {
    memory: Arc<RwLock<MemoryManager>>,
}

impl RecallTool {
    pub fn new(memory: Arc<RwLock<MemoryManager>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        "recall_conversation"
    }

    fn description(&self) -> &str {
        "Search earlier turns of THIS conversation by keyword. Use when the user refers \
         to something discussed before."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: RecallArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let terms: Vec<String> = args
            .query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_string())
            .collect();

        let memory = self.memory.read().await;
        let mut hits: Vec<Value> = Vec::new();
        for turn in memory.turns() {
            let content = turn.content.to_lowercase();
            let matched = if terms.is_empty() {
                content.contains(&args.query.to_lowercase())
            } else {
                terms.iter().any(|t| content.contains(t))
            };
            if matched {
                hits.push(serde_json::json!({
                    "role": turn.role.as_str(),
                    "content": turn.content,
                    "timestamp": turn.timestamp.to_rfc3339(),
                }));
            }
        }
        // 最近的在前，最多 3 条
        hits.reverse();
        hits.truncate(3);
        Ok(serde_json::json!({"query": args.query, "matches": hits}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recall_matches_recent_first() {
        let memory = Arc::new(RwLock::new(MemoryManager::new(40)));
        {
            let mut m = memory.write().await;
            m.append(crate::memory::ConversationTurn::user(
                "any emails about the placement drive?",
            ));
            m.append(crate::memory::ConversationTurn::agent(
                "Found one placement email from the PoC.",
            ));
            m.append(crate::memory::ConversationTurn::user("thanks"));
        }
        let tool = RecallTool::new(memory);
        let out = tool
            .execute(serde_json::json!({"query": "placement"}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let matches = parsed["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 2);
        // 最近的一条排在前
        assert_eq!(matches[0]["role"], "agent");
    }

    #[tokio::test]
    async fn test_recall_no_match() {
        let memory = Arc::new(RwLock::new(MemoryManager::new(40)));
        let tool = RecallTool::new(memory);
        let out = tool
            .execute(serde_json::json!({"query": "nothing"}))
            .await
            .unwrap();
        assert!(out.contains("\"matches\":[]"));
    }
}
