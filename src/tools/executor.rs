//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用
//! registry.invoke，超时转为 AgentError::ToolTimeout；每次调用输出结构化
//! 审计日志（JSON），含类别与耗时。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolCategory, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并输出 JSON 审计日志
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；校验失败/未知工具/执行失败/超时分别映射为对应 AgentError
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let category = self
            .registry
            .category_of(tool_name)
            .map(|c| c.as_str())
            .unwrap_or("unknown");

        let result = timeout(self.timeout, self.registry.invoke(tool_name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(AgentError::ToolNotFound(_))) => "not_found",
            Ok(Err(AgentError::ArgumentValidation(_))) => "invalid_args",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "category": category,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 校验参数（复核者修改参数后的再校验入口，不发起调用）
    pub fn validate(&self, tool_name: &str, args: &serde_json::Value) -> Result<(), AgentError> {
        self.registry.validate(tool_name, args)
    }

    pub fn category_of(&self, tool_name: &str) -> Option<ToolCategory> {
        self.registry.category_of(tool_name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn schema_json(&self) -> String {
        self.registry.to_schema_json()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
