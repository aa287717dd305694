//! 人工复核闸门（HITL）
//!
//! 所有带副作用的路径都必须穿过这里：AutoApprove 直接执行，Reject 直接封禁，
//! NeedsReview 挂起到 ReviewBroker，等复核者经 oneshot 回传 批准/改参/否决。
//! 等待期间会话不占用 LLM 资源；超时与取消都有确定的终态。复核者改参后
//! 必须重新过参数校验，改参非法给一次重试机会，再失败按否决处理。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::AgentError;
use crate::react::events::{send_event, AgentEvent};
use crate::react::judge::{Judgment, Verdict};
use crate::react::planner::Action;
use crate::tools::ToolExecutor;

/// 闸门内部状态（仅用于 trace，不对外承诺）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GateState {
    Judged,
    Executing,
    AwaitingReview,
    Approved,
    Modified,
    Denied,
    TimedOut,
    Cancelled,
    Done,
}

impl GateState {
    fn as_str(&self) -> &'static str {
        match self {
            GateState::Judged => "judged",
            GateState::Executing => "executing",
            GateState::AwaitingReview => "awaiting_review",
            GateState::Approved => "approved",
            GateState::Modified => "modified",
            GateState::Denied => "denied",
            GateState::TimedOut => "timed_out",
            GateState::Cancelled => "cancelled",
            GateState::Done => "done",
        }
    }
}

/// 一次行动的终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// 按原参数执行成功
    Executed,
    /// 复核者改参后执行成功
    UserModified,
    /// 评审拒绝，未执行
    Rejected,
    /// 复核者否决（或超时/改参两次非法），未执行
    UserDenied,
    /// 执行发起但失败
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Executed => "executed",
            OutcomeStatus::UserModified => "user_modified",
            OutcomeStatus::Rejected => "rejected",
            OutcomeStatus::UserDenied => "user_denied",
            OutcomeStatus::Failed => "failed",
        }
    }
}

/// 行动记录：每个被评审的提议恰好产生一条
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub status: OutcomeStatus,
    pub confidence: f64,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// 复核者的三种决定
#[derive(Debug, Clone)]
pub enum ReviewDecision {
    Approve,
    /// 用改过的参数执行
    Modify(Value),
    Deny,
}

/// 挂起中的复核项（可列出给任意复核界面）
#[derive(Debug, Clone, Serialize)]
pub struct PendingReview {
    pub review_id: Uuid,
    pub session_id: Uuid,
    pub tool: String,
    pub args: Value,
    pub rationale: String,
    pub confidence: f64,
    /// 上一次改参未过 schema 校验时的错误文本（重挂时带给复核者）
    pub validation_error: Option<String>,
}

/// 复核中介：挂起项按 review_id 存放，复核者从任意任务 resolve
#[derive(Default)]
pub struct ReviewBroker {
    pending: Mutex<HashMap<Uuid, (PendingReview, oneshot::Sender<ReviewDecision>)>>,
}

impl ReviewBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个挂起项，返回等待决定的接收端
    pub async fn submit(&self, review: PendingReview) -> oneshot::Receiver<ReviewDecision> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(review.review_id, (review, tx));
        rx
    }

    /// 回传决定；review_id 未知或已结案时返回 false
    pub async fn resolve(&self, review_id: Uuid, decision: ReviewDecision) -> bool {
        match self.pending.lock().await.remove(&review_id) {
            Some((_, tx)) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// 当前所有挂起项
    pub async fn list_pending(&self) -> Vec<PendingReview> {
        self.pending
            .lock()
            .await
            .values()
            .map(|(review, _)| review.clone())
            .collect()
    }

    /// 撤销一个挂起项（超时/取消路径）
    pub async fn release(&self, review_id: Uuid) {
        self.pending.lock().await.remove(&review_id);
    }

    /// 撤销某会话的全部挂起项（会话取消时调用）
    pub async fn release_session(&self, session_id: Uuid) {
        self.pending
            .lock()
            .await
            .retain(|_, (review, _)| review.session_id != session_id);
    }
}

enum AwaitResult {
    Decision(ReviewDecision),
    TimedOut,
    Cancelled,
}

/// 人工复核闸门
pub struct HitlGate {
    broker: Arc<ReviewBroker>,
    review_timeout: Option<Duration>,
}

impl HitlGate {
    pub fn new(broker: Arc<ReviewBroker>, review_timeout: Option<Duration>) -> Self {
        Self {
            broker,
            review_timeout,
        }
    }

    pub fn broker(&self) -> Arc<ReviewBroker> {
        self.broker.clone()
    }

    /// 按裁决分流一次行动，返回其唯一终态记录。
    /// 唯一的 Err 分支是会话取消（Cancelled），此时不产生终态。
    pub async fn dispatch(
        &self,
        judgment: Judgment,
        executor: &ToolExecutor,
        session_id: Uuid,
        cancel: &CancellationToken,
        event_tx: &Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<ExecutionOutcome, AgentError> {
        let Judgment {
            action,
            confidence,
            verdict,
            ..
        } = judgment;
        self.trace(&action.tool, GateState::Judged);

        match verdict {
            Verdict::Reject => {
                self.trace(&action.tool, GateState::Done);
                Ok(self.finish(ExecutionOutcome {
                    status: OutcomeStatus::Rejected,
                    confidence,
                    result: None,
                    error: Some(format!(
                        "rejected: confidence {confidence:.2} below threshold or contradicted by context"
                    )),
                    action,
                }))
            }
            Verdict::AutoApprove => {
                self.trace(&action.tool, GateState::Executing);
                let args = action.args.clone();
                Ok(self
                    .run(action, confidence, args, OutcomeStatus::Executed, executor)
                    .await)
            }
            Verdict::NeedsReview => {
                self.review_flow(action, confidence, executor, session_id, cancel, event_tx)
                    .await
            }
        }
    }

    /// NeedsReview 分支：挂起、等待、按决定收尾。改参非法最多重挂一次。
    async fn review_flow(
        &self,
        action: Action,
        confidence: f64,
        executor: &ToolExecutor,
        session_id: Uuid,
        cancel: &CancellationToken,
        event_tx: &Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<ExecutionOutcome, AgentError> {
        let mut revalidations = 0;
        let mut validation_error: Option<String> = None;
        loop {
            let review = PendingReview {
                review_id: Uuid::new_v4(),
                session_id,
                tool: action.tool.clone(),
                args: action.args.clone(),
                rationale: action.rationale.clone(),
                confidence,
                validation_error: validation_error.clone(),
            };
            let review_id = review.review_id;
            send_event(
                event_tx,
                AgentEvent::AwaitingReview {
                    review_id,
                    tool: review.tool.clone(),
                    args: review.args.clone(),
                    rationale: review.rationale.clone(),
                    confidence,
                    validation_error: validation_error.clone(),
                },
            );
            let rx = self.broker.submit(review).await;
            self.trace(&action.tool, GateState::AwaitingReview);

            match self.await_decision(rx, cancel).await {
                AwaitResult::Cancelled => {
                    self.broker.release(review_id).await;
                    self.trace(&action.tool, GateState::Cancelled);
                    return Err(AgentError::Cancelled);
                }
                AwaitResult::TimedOut => {
                    self.broker.release(review_id).await;
                    self.trace(&action.tool, GateState::TimedOut);
                    return Ok(self.finish(ExecutionOutcome {
                        status: OutcomeStatus::UserDenied,
                        confidence,
                        result: None,
                        error: Some(AgentError::ReviewTimeout.to_string()),
                        action,
                    }));
                }
                AwaitResult::Decision(ReviewDecision::Deny) => {
                    self.trace(&action.tool, GateState::Denied);
                    return Ok(self.finish(ExecutionOutcome {
                        status: OutcomeStatus::UserDenied,
                        confidence,
                        result: None,
                        error: Some("denied by reviewer".to_string()),
                        action,
                    }));
                }
                AwaitResult::Decision(ReviewDecision::Approve) => {
                    self.trace(&action.tool, GateState::Approved);
                    let args = action.args.clone();
                    return Ok(self
                        .run(action, confidence, args, OutcomeStatus::Executed, executor)
                        .await);
                }
                AwaitResult::Decision(ReviewDecision::Modify(new_args)) => {
                    if let Err(e) = executor.validate(&action.tool, &new_args) {
                        revalidations += 1;
                        tracing::warn!(tool = %action.tool, error = %e, "modified args invalid");
                        if revalidations > 1 {
                            self.trace(&action.tool, GateState::Denied);
                            return Ok(self.finish(ExecutionOutcome {
                                status: OutcomeStatus::UserDenied,
                                confidence,
                                result: None,
                                error: Some(format!("modified arguments rejected twice: {e}")),
                                action,
                            }));
                        }
                        // 带着校验错误重新挂起，让复核者再改一次
                        validation_error = Some(e.to_string());
                        continue;
                    }
                    self.trace(&action.tool, GateState::Modified);
                    return Ok(self
                        .run(
                            action,
                            confidence,
                            new_args,
                            OutcomeStatus::UserModified,
                            executor,
                        )
                        .await);
                }
            }
        }
    }

    /// 实际执行；成功记 on_success，失败记 Failed。改参执行时终态里的
    /// action.args 替换为实际用的参数。
    async fn run(
        &self,
        mut action: Action,
        confidence: f64,
        args: Value,
        on_success: OutcomeStatus,
        executor: &ToolExecutor,
    ) -> ExecutionOutcome {
        self.trace(&action.tool, GateState::Executing);
        let outcome = match executor.execute(&action.tool, args.clone()).await {
            Ok(result) => {
                action.args = args;
                ExecutionOutcome {
                    status: on_success,
                    confidence,
                    result: Some(result),
                    error: None,
                    action,
                }
            }
            Err(e) => ExecutionOutcome {
                status: OutcomeStatus::Failed,
                confidence,
                result: None,
                error: Some(e.to_string()),
                action,
            },
        };
        self.trace(&outcome.action.tool, GateState::Done);
        self.finish(outcome)
    }

    /// 每个终态一条 JSON 审计日志
    fn finish(&self, outcome: ExecutionOutcome) -> ExecutionOutcome {
        let audit = serde_json::json!({
            "event": "gate_audit",
            "tool": outcome.action.tool,
            "status": outcome.status.as_str(),
            "confidence": outcome.confidence,
            "error": outcome.error,
        });
        tracing::info!(audit = %audit.to_string(), "gate");
        outcome
    }

    async fn await_decision(
        &self,
        mut rx: oneshot::Receiver<ReviewDecision>,
        cancel: &CancellationToken,
    ) -> AwaitResult {
        match self.review_timeout {
            Some(timeout) => {
                tokio::select! {
                    _ = cancel.cancelled() => AwaitResult::Cancelled,
                    _ = tokio::time::sleep(timeout) => AwaitResult::TimedOut,
                    res = &mut rx => match res {
                        Ok(decision) => AwaitResult::Decision(decision),
                        // 发送端被丢弃（挂起项被撤销）按否决处理
                        Err(_) => AwaitResult::TimedOut,
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => AwaitResult::Cancelled,
                    res = &mut rx => match res {
                        Ok(decision) => AwaitResult::Decision(decision),
                        Err(_) => AwaitResult::TimedOut,
                    },
                }
            }
        }
    }

    fn trace(&self, tool: &str, state: GateState) {
        tracing::debug!(tool, state = state.as_str(), "gate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use crate::react::judge::EntailmentLabel;
    use crate::tools::{Tool, ToolRegistry};

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "probe"
        }

        fn description(&self) -> &str {
            "test probe"
        }

        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"target": {"type": "string"}},
                "required": ["target"]
            })
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("probed {}", args["target"]))
        }
    }

    fn setup(timeout: Option<Duration>) -> (HitlGate, ToolExecutor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool {
            calls: calls.clone(),
        });
        let executor = ToolExecutor::new(registry, 5);
        let gate = HitlGate::new(Arc::new(ReviewBroker::new()), timeout);
        (gate, executor, calls)
    }

    fn judgment(verdict: Verdict, confidence: f64) -> Judgment {
        Judgment {
            action: Action {
                tool: "probe".to_string(),
                args: serde_json::json!({"target": "x"}),
                rationale: "test".to_string(),
            },
            confidence,
            verdict,
            label: EntailmentLabel::Neutral,
        }
    }

    async fn resolve_when_pending(broker: Arc<ReviewBroker>, decision: ReviewDecision) {
        loop {
            let pending = broker.list_pending().await;
            if let Some(review) = pending.first() {
                broker.resolve(review.review_id, decision).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_reject_never_executes() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let outcome = gate
            .dispatch(
                judgment(Verdict::Reject, 0.1),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_approve_executes() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let outcome = gate
            .dispatch(
                judgment(Verdict::AutoApprove, 0.95),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Executed);
        assert!(outcome.result.unwrap().contains("probed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_review_approve() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let broker = gate.broker();
        tokio::spawn(resolve_when_pending(broker, ReviewDecision::Approve));

        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Executed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_review_deny_never_executes() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let broker = gate.broker();
        tokio::spawn(resolve_when_pending(broker, ReviewDecision::Deny));

        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::UserDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_review_modify_executes_with_new_args() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let broker = gate.broker();
        tokio::spawn(resolve_when_pending(
            broker,
            ReviewDecision::Modify(serde_json::json!({"target": "edited"})),
        ));

        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::UserModified);
        assert_eq!(outcome.action.args["target"], "edited");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_review_modify_invalid_twice_is_denied() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let broker = gate.broker();
        // 两次都改出非法参数（缺 required）
        tokio::spawn(async move {
            for _ in 0..2 {
                resolve_when_pending(
                    broker.clone(),
                    ReviewDecision::Modify(serde_json::json!({"wrong": 1})),
                )
                .await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::UserDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_modify_resubmits_with_error() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let broker = gate.broker();
        let seen: Arc<Mutex<Vec<PendingReview>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_tx = seen.clone();
        tokio::spawn(async move {
            // 第一次改出非法参数（缺 required）
            resolve_when_pending(
                broker.clone(),
                ReviewDecision::Modify(serde_json::json!({"wrong": 1})),
            )
            .await;
            // 第二次挂起项应带上校验错误，记录后否决
            loop {
                if let Some(review) = broker.list_pending().await.first().cloned() {
                    seen_tx.lock().await.push(review.clone());
                    broker.resolve(review.review_id, ReviewDecision::Deny).await;
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::UserDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert!(seen[0].validation_error.as_deref().unwrap().contains("target"));
    }

    #[tokio::test]
    async fn test_review_timeout_is_denied() {
        let (gate, executor, calls) = setup(Some(Duration::from_millis(20)));
        let cancel = CancellationToken::new();
        let outcome = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::UserDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // 超时后挂起项应被撤销
        assert!(gate.broker().list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_releases_pending() {
        let (gate, executor, calls) = setup(None);
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.cancel();
        });

        let err = gate
            .dispatch(
                judgment(Verdict::NeedsReview, 0.6),
                &executor,
                Uuid::new_v4(),
                &cancel,
                &None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(gate.broker().list_pending().await.is_empty());
    }
}
