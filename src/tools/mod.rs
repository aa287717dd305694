//! 工具层
//!
//! Tool trait 与注册表、参数校验、带超时与审计日志的执行器，以及邮件/日历/
//! 任务/回忆四组内置工具。所有远端能力都隔在 trait 边界之后。

pub mod calendar;
pub mod email;
pub mod executor;
pub mod recall;
pub mod registry;
pub mod schema;
pub mod tasks;
pub mod timeparse;

pub use calendar::{CalendarClient, CalendarEvent, CreateEventTool, InMemoryCalendar, UpcomingEventsTool};
pub use email::{
    DeleteEmailTool, EmailRecord, EmailStore, GetEmailDetailsTool, InMemoryEmailStore,
    KeywordSearchTool, SearchEmailsTool,
};
pub use executor::ToolExecutor;
pub use recall::RecallTool;
pub use registry::{Tool, ToolCategory, ToolRegistry};
pub use schema::{decision_schema_json, validate_args};
pub use tasks::{CreateTaskTool, InMemoryTasks, ListTasksTool, TaskClient, TaskItem};
