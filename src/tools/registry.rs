//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / category /
//! execute），由 ToolRegistry 按名注册与查找。invoke 在任何外部调用之前强制做
//! schema 校验；注册表本身不含任何领域/风险逻辑，category 标签只供 ActionJudge
//! 的阈值表消费。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::validate_args;

/// 工具类别：只读 / 写入 / 破坏性。仅用于评审阈值选择，注册表对其一视同仁。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    ReadOnly,
    Write,
    Destructive,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::ReadOnly => "read_only",
            ToolCategory::Write => "write",
            ToolCategory::Destructive => "destructive",
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、类别、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（决策 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（required + 各属性 type），invoke 前据此校验
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 工具类别；默认只读
    fn category(&self) -> ToolCategory {
        ToolCategory::ReadOnly
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，invoke 前强制 schema 校验
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|t| t.category())
    }

    /// 校验参数是否满足工具 schema（不发起任何调用）
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        validate_args(&tool.parameters_schema(), args)
            .map_err(|e| AgentError::ArgumentValidation(format!("{name}: {e}")))
    }

    /// 调用工具：校验严格先于执行；名称未知或参数非法时不发起任何外部调用
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        validate_args(&tool.parameters_schema(), &args)
            .map_err(|e| AgentError::ArgumentValidation(format!("{name}: {e}")))?;
        tool.execute(args)
            .await
            .map_err(AgentError::ToolExecutionFailed)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 动态生成工具 schema JSON，拼入 system prompt 的 Available tools 段落
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "category": tool.category().as_str(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
