//! 邮件工具
//!
//! search_emails_rag：首选的语义邮件检索（走 SemanticIndex 边界，支持发件人/
//! 日期过滤）；search_emails_keyword：关键词直查回退；get_email_details：
//! 按 id 取完整邮件正文（EmailStore 边界，自动剥离分块后缀）；
//! delete_email：破坏性删除，走更严的评审阈值。
//! 远端实现（Gmail 等）在 trait 之后；InMemoryEmailStore 供演示与测试。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::memory::{IndexQuery, SemanticIndex};
use crate::tools::timeparse;
use crate::tools::{Tool, ToolCategory};

/// 完整邮件记录（EmailStore 边界的返回单元）
#[derive(Debug, Clone)]
pub struct EmailRecord {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
}

/// 邮件正文存储边界：按 id 取/删完整邮件，以及关键词直查
#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<EmailRecord>, String>;
    /// 返回是否确有删除
    async fn delete(&self, id: &str) -> Result<bool, String>;
    /// 主题/发件人/正文的关键词子串匹配（语义检索未命中时的回退路径）
    async fn search(&self, keyword: &str) -> Result<Vec<EmailRecord>, String>;
}

/// 内存邮件存储（演示与测试）
#[derive(Default)]
pub struct InMemoryEmailStore {
    emails: RwLock<HashMap<String, EmailRecord>>,
}

impl InMemoryEmailStore {
    pub fn new(records: Vec<EmailRecord>) -> Self {
        let emails = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            emails: RwLock::new(emails),
        }
    }
}

#[async_trait]
impl EmailStore for InMemoryEmailStore {
    async fn get(&self, id: &str) -> Result<Option<EmailRecord>, String> {
        Ok(self.emails.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, String> {
        Ok(self.emails.write().await.remove(id).is_some())
    }

    async fn search(&self, keyword: &str) -> Result<Vec<EmailRecord>, String> {
        let needle = keyword.to_lowercase();
        let mut hits: Vec<EmailRecord> = self
            .emails
            .read()
            .await
            .values()
            .filter(|e| {
                e.subject.to_lowercase().contains(&needle)
                    || e.sender.to_lowercase().contains(&needle)
                    || e.body.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(hits)
    }
}

/// 分块索引 id 还原为原始邮件 id（"abc_chunk_0" -> "abc"）
fn strip_chunk_suffix(id: &str) -> &str {
    match id.find("_chunk_") {
        Some(pos) => &id[..pos],
        None => id,
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    sender: Option<String>,
    date_after: Option<String>,
    n_results: Option<usize>,
}

/// 语义邮件检索工具（首选；邮件由外部每日索引）
pub struct SearchEmailsTool {
    index: Arc<dyn SemanticIndex>,
}

impl SearchEmailsTool {
    pub fn new(index: Arc<dyn SemanticIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for SearchEmailsTool {
    fn name(&self) -> &str {
        "search_emails_rag"
    }

    fn description(&self) -> &str {
        "PRIMARY email search over the indexed mailbox. Semantic query plus optional sender \
         and date_after filters ('2026-01-15', 'yesterday', 'last 3 days'). Use this first \
         for any email question; follow up with get_email_details for full bodies."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "sender": {"type": "string"},
                "date_after": {"type": "string"},
                "n_results": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SearchArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let after = args
            .date_after
            .as_deref()
            .and_then(|d| timeparse::parse_after(d, Utc::now()));
        let hits = self.index.search(&IndexQuery {
            text: args.query.clone(),
            sender: args.sender,
            after,
            limit: args.n_results.unwrap_or(10).min(20),
        });

        let emails: Vec<Value> = hits
            .iter()
            .map(|c| {
                serde_json::json!({
                    "email_id": strip_chunk_suffix(&c.id),
                    "subject": c.subject,
                    "sender": c.sender,
                    "date": c.date.map(|d| d.to_rfc3339()),
                    "snippet": c.snippet,
                    "relevance_score": format!("{:.3}", c.score),
                })
            })
            .collect();
        let out = serde_json::json!({
            "count": emails.len(),
            "query": args.query,
            "emails": emails,
        });
        Ok(out.to_string())
    }
}

#[derive(Deserialize)]
struct KeywordArgs {
    query: String,
    max_results: Option<usize>,
}

/// 关键词直查工具（语义检索未命中时的回退）
pub struct KeywordSearchTool {
    store: Arc<dyn EmailStore>,
}

impl KeywordSearchTool {
    pub fn new(store: Arc<dyn EmailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for KeywordSearchTool {
    fn name(&self) -> &str {
        "search_emails_keyword"
    }

    fn description(&self) -> &str {
        "FALLBACK exact keyword search scanning subject, sender and body directly. \
         Use only when search_emails_rag returns nothing relevant."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "max_results": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: KeywordArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let mut hits = self.store.search(&args.query).await?;
        hits.truncate(args.max_results.unwrap_or(10).min(20));
        let emails: Vec<Value> = hits
            .iter()
            .map(|e| {
                serde_json::json!({
                    "email_id": e.id,
                    "subject": e.subject,
                    "sender": e.sender,
                    "date": e.date,
                    "snippet": e.body.chars().take(200).collect::<String>(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "count": emails.len(),
            "query": args.query,
            "emails": emails,
        });
        Ok(out.to_string())
    }
}

#[derive(Deserialize)]
struct DetailArgs {
    email_id: String,
}

/// 按 id 取完整邮件内容（检索之后使用，避免重复搜索）
pub struct GetEmailDetailsTool {
    store: Arc<dyn EmailStore>,
}

impl GetEmailDetailsTool {
    pub fn new(store: Arc<dyn EmailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetEmailDetailsTool {
    fn name(&self) -> &str {
        "get_email_details"
    }

    fn description(&self) -> &str {
        "Fetch the full body and metadata of one email by email_id (from search_emails_rag \
         results). The returned body is complete; do not fetch the same id twice."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string"}
            },
            "required": ["email_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DetailArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let id = strip_chunk_suffix(&args.email_id).to_string();
        match self.store.get(&id).await? {
            Some(email) => {
                let out = serde_json::json!({
                    "email_id": email.id,
                    "subject": email.subject,
                    "sender": email.sender,
                    "date": email.date,
                    "body": email.body,
                    "complete": true,
                });
                Ok(out.to_string())
            }
            None => Err(format!("email {id} not found")),
        }
    }
}

/// 删除邮件（破坏性；评审走 destructive 阈值）
pub struct DeleteEmailTool {
    store: Arc<dyn EmailStore>,
}

impl DeleteEmailTool {
    pub fn new(store: Arc<dyn EmailStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteEmailTool {
    fn name(&self) -> &str {
        "delete_email"
    }

    fn description(&self) -> &str {
        "Permanently delete one email by email_id. Irreversible; only when the user explicitly \
         asks for deletion."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string"}
            },
            "required": ["email_id"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Destructive
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: DetailArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let id = strip_chunk_suffix(&args.email_id).to_string();
        if self.store.delete(&id).await? {
            Ok(serde_json::json!({"deleted": true, "email_id": id}).to_string())
        } else {
            Err(format!("email {id} not found"))
        }
    }
}
