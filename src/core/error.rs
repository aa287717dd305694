//! Agent 错误类型
//!
//! 执行核心的错误分类：决策解析、参数校验、工具调用、评审器（Judge）不可用、
//! 人工复核超时、取消等。每类错误对应一种 ExecutionOutcome 映射，
//! 单个 Action 的失败不会中止整个会话。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 决策生成器输出无法解析为 Action / FINAL_ANSWER（含 rationale 缺失）
    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    /// 工具参数不满足 schema（在任何外部调用之前拦截）
    #[error("Argument validation failed: {0}")]
    ArgumentValidation(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 置信度评分器调用失败（按策略回退到人工复核或直接拒绝）
    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    /// 人工复核在超时时间内未给出决定（映射为 USER_DENIED）
    #[error("Review timed out")]
    ReviewTimeout,

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}
