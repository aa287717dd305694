//! 任务（提醒）工具
//!
//! create_task：创建待办（写入）；list_tasks：列出未完成待办（只读）。
//! TaskClient 是远端任务系统（Google Tasks 等）的边界；InMemoryTasks
//! 供演示与测试。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::tools::timeparse;
use crate::tools::{Tool, ToolCategory};

/// 待办任务
#[derive(Debug, Clone)]
pub struct TaskItem {
    pub title: String,
    pub notes: String,
    pub due: Option<DateTime<Utc>>,
}

/// 任务边界：创建与列出未完成任务
#[async_trait]
pub trait TaskClient: Send + Sync {
    async fn create(&self, task: TaskItem) -> Result<(), String>;
    async fn pending(&self) -> Result<Vec<TaskItem>, String>;
}

/// 内存任务列表（演示与测试）
#[derive(Default)]
pub struct InMemoryTasks {
    tasks: RwLock<Vec<TaskItem>>,
}

#[async_trait]
impl TaskClient for InMemoryTasks {
    async fn create(&self, task: TaskItem) -> Result<(), String> {
        self.tasks.write().await.push(task);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<TaskItem>, String> {
        Ok(self.tasks.read().await.clone())
    }
}

#[derive(Deserialize)]
struct CreateTaskArgs {
    title: String,
    notes: Option<String>,
    due: Option<String>,
}

/// 创建待办（写入）
pub struct CreateTaskTool {
    client: Arc<dyn TaskClient>,
}

impl CreateTaskTool {
    pub fn new(client: Arc<dyn TaskClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Create a to-do task / reminder. Optional `due` accepts natural language \
         ('tomorrow', 'tomorrow 5pm') or '2026-04-01'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "notes": {"type": "string"},
                "due": {"type": "string"}
            },
            "required": ["title"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CreateTaskArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let due = args
            .due
            .as_deref()
            .map(|d| timeparse::parse_datetime(d, Utc::now()));
        let task = TaskItem {
            title: args.title.clone(),
            notes: args.notes.unwrap_or_default(),
            due,
        };
        self.client.create(task).await?;
        let out = serde_json::json!({
            "created": true,
            "title": args.title,
            "due": due.map(|d| d.to_rfc3339()),
        });
        Ok(out.to_string())
    }
}

/// 列出未完成待办
pub struct ListTasksTool {
    client: Arc<dyn TaskClient>,
}

impl ListTasksTool {
    pub fn new(client: Arc<dyn TaskClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List all pending to-do tasks. Read-only."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let tasks = self.client.pending().await?;
        let items: Vec<Value> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "title": t.title,
                    "notes": t.notes,
                    "due": t.due.map(|d| d.to_rfc3339()),
                })
            })
            .collect();
        Ok(serde_json::json!({"count": items.len(), "tasks": items}).to_string())
    }
}
