//! 循环事件
//!
//! 循环各阶段通过 mpsc 向外发事件（CLI 渲染、测试断言都靠它）。
//! 发送失败只说明没有接收方，静默忽略。

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// 智能体循环对外可见的事件流
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 迭代进度
    StepUpdate { iteration: usize, max: usize },
    /// 规划器原始输出（调试用）
    Thinking { text: String },
    /// 提议了一次工具调用
    ActionProposed {
        tool: String,
        args: serde_json::Value,
        rationale: String,
    },
    /// 评审结论
    Judged {
        tool: String,
        confidence: f64,
        verdict: String,
        label: String,
    },
    /// 行动挂起，等待人工复核
    AwaitingReview {
        review_id: Uuid,
        tool: String,
        args: serde_json::Value,
        rationale: String,
        confidence: f64,
        /// 上一次改参被 schema 拒绝时的错误文本
        validation_error: Option<String>,
    },
    /// 一次行动的终态
    Outcome {
        tool: String,
        status: String,
        result: Option<String>,
        error: Option<String>,
    },
    /// 最终回答
    MessageDone { content: String },
    /// 循环级错误
    Error { message: String },
}

/// 尽力投递一个事件；无人接收则丢弃
pub fn send_event(tx: &Option<mpsc::UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
