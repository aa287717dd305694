//! 日历工具
//!
//! get_upcoming_events：查询未来 N 天的日程（只读）；create_calendar_event：
//! 创建日程（写入，走 write 阈值）。起始时间支持自然语言（timeparse）。
//! CalendarClient 是远端日历（Google Calendar 等）的边界；InMemoryCalendar
//! 供演示与测试。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::tools::timeparse;
use crate::tools::{Tool, ToolCategory};

/// 日历事件
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: String,
}

/// 日历边界：查询未来日程与创建事件
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn upcoming(&self, days: i64) -> Result<Vec<CalendarEvent>, String>;
    async fn create(&self, event: CalendarEvent) -> Result<(), String>;
}

/// 内存日历（演示与测试）
#[derive(Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }
}

#[async_trait]
impl CalendarClient for InMemoryCalendar {
    async fn upcoming(&self, days: i64) -> Result<Vec<CalendarEvent>, String> {
        let now = Utc::now();
        let horizon = now + Duration::days(days);
        let mut hits: Vec<CalendarEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.start >= now && e.start <= horizon)
            .cloned()
            .collect();
        hits.sort_by_key(|e| e.start);
        Ok(hits)
    }

    async fn create(&self, event: CalendarEvent) -> Result<(), String> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[derive(Deserialize)]
struct UpcomingArgs {
    days: Option<i64>,
}

/// 未来日程查询工具
pub struct UpcomingEventsTool {
    calendar: Arc<dyn CalendarClient>,
}

impl UpcomingEventsTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for UpcomingEventsTool {
    fn name(&self) -> &str {
        "get_upcoming_events"
    }

    fn description(&self) -> &str {
        "List calendar events in the next `days` days (default 7). Read-only."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "days": {"type": "integer"}
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: UpcomingArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let days = args.days.unwrap_or(7).clamp(1, 90);
        let events = self.calendar.upcoming(days).await?;
        let items: Vec<Value> = events
            .iter()
            .map(|e| {
                serde_json::json!({
                    "title": e.title,
                    "start": e.start.to_rfc3339(),
                    "end": e.end.to_rfc3339(),
                    "description": e.description,
                })
            })
            .collect();
        Ok(serde_json::json!({"days": days, "count": items.len(), "events": items}).to_string())
    }
}

#[derive(Deserialize)]
struct CreateEventArgs {
    title: String,
    start_time: String,
    duration_minutes: Option<i64>,
    description: Option<String>,
}

/// 创建日历事件（写入）
pub struct CreateEventTool {
    calendar: Arc<dyn CalendarClient>,
}

impl CreateEventTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a calendar event. start_time accepts natural language ('tomorrow 10am', \
         'today 15:00') or '2026-04-01 15:30'. duration_minutes defaults to 60."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "start_time": {"type": "string"},
                "duration_minutes": {"type": "integer"},
                "description": {"type": "string"}
            },
            "required": ["title", "start_time"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CreateEventArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let start = timeparse::parse_datetime(&args.start_time, Utc::now());
        let duration = args.duration_minutes.unwrap_or(60).clamp(5, 24 * 60);
        let event = CalendarEvent {
            title: args.title.clone(),
            start,
            end: start + Duration::minutes(duration),
            description: args.description.unwrap_or_default(),
        };
        self.calendar.create(event).await?;
        let out = serde_json::json!({
            "created": true,
            "title": args.title,
            "start": start.to_rfc3339(),
            "duration_minutes": duration,
        });
        Ok(out.to_string())
    }
}
