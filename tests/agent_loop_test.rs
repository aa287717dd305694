//! 端到端循环测试：脚本化 LLM + 内存后端，覆盖三态裁决、人工复核、
//! 迭代预算与“每个提议恰好一条终态”的约束。

use std::sync::Arc;
use std::time::Duration;

use aegis::agent::{Assistant, AssistantBackends};
use aegis::config::AppConfig;
use aegis::llm::{MockDecisionClient, MockScorer};
use aegis::memory::{InMemoryEmailIndex, IndexedEmail};
use aegis::react::{OutcomeStatus, ReviewBroker, ReviewDecision};
use aegis::tools::{
    EmailRecord, EmailStore, InMemoryCalendar, InMemoryEmailStore, InMemoryTasks, TaskClient,
};

struct Fixture {
    assistant: Assistant,
    emails: Arc<InMemoryEmailStore>,
    tasks: Arc<InMemoryTasks>,
}

fn fixture(config: AppConfig, decision: MockDecisionClient, scorer: MockScorer) -> Fixture {
    let records = vec![EmailRecord {
        id: "m-1".to_string(),
        subject: "Placement drive next week".to_string(),
        sender: "placement-office@example.edu".to_string(),
        date: "2026-08-25".to_string(),
        body: "The placement drive starts Monday, register by Friday.".to_string(),
    }];
    let indexed = records
        .iter()
        .map(|r| IndexedEmail {
            id: format!("{}_chunk_0", r.id),
            subject: r.subject.clone(),
            sender: r.sender.clone(),
            date: None,
            body: r.body.clone(),
        })
        .collect();

    let emails = Arc::new(InMemoryEmailStore::new(records));
    let tasks = Arc::new(InMemoryTasks::default());
    let backends = AssistantBackends {
        decision: Arc::new(decision),
        scorer: Arc::new(scorer),
        index: Arc::new(InMemoryEmailIndex::new(indexed)),
        emails: emails.clone(),
        calendar: Arc::new(InMemoryCalendar::default()),
        tasks: tasks.clone(),
    };
    Fixture {
        assistant: Assistant::new(config, backends),
        emails,
        tasks,
    }
}

fn tool_call(tool: &str, args: serde_json::Value, rationale: &str) -> String {
    serde_json::json!({
        "action": "tool_call",
        "tool": tool,
        "args": args,
        "rationale": rationale,
    })
    .to_string()
}

fn final_answer(content: &str) -> String {
    serde_json::json!({"action": "final_answer", "content": content}).to_string()
}

/// 后台复核者：等到出现挂起项就回传给定决定
fn spawn_reviewer(broker: Arc<ReviewBroker>, decision: ReviewDecision) {
    tokio::spawn(async move {
        loop {
            if let Some(review) = broker.list_pending().await.first().cloned() {
                broker.resolve(review.review_id, decision).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
}

// 低置信度的破坏性调用必须被拒绝，且目标完好无损
#[tokio::test]
async fn test_low_confidence_destructive_is_rejected() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "delete_email",
            serde_json::json!({"email_id": "m-1"}),
            "clean up the inbox",
        ),
        final_answer("I did not delete anything."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.2));

    let session = fx.assistant.session(None);
    let result = session.process("what's in my inbox?").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Rejected);
    assert!(result.outcomes[0].result.is_none());
    // 邮件必须还在
    assert!(fx.emails.get("m-1").await.unwrap().is_some());
}

// 高置信度的只读调用自动放行并执行
#[tokio::test]
async fn test_high_confidence_read_auto_executes() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "search_emails_rag",
            serde_json::json!({"query": "placement drive"}),
            "user asked about placements",
        ),
        final_answer("Found the placement drive email."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.9));

    let session = fx.assistant.session(None);
    let result = session.process("any emails about placements?").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.answer.as_deref(), Some("Found the placement drive email."));
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Executed);
    assert!(result.outcomes[0].result.as_deref().unwrap().contains("m-1"));
}

// 中置信度挂起复核；复核者否决后工具绝不执行
#[tokio::test]
async fn test_mid_confidence_denied_never_executes() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "create_task",
            serde_json::json!({"title": "follow up"}),
            "seems like a follow-up is wanted",
        ),
        final_answer("Okay, I won't create the task."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.6));

    let session = fx.assistant.session(None);
    spawn_reviewer(fx.assistant.broker(), ReviewDecision::Deny);
    let result = session.process("hmm, maybe remind me?").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::UserDenied);
    assert!(fx.tasks.pending().await.unwrap().is_empty());
}

// 复核者改参后执行，终态记 user_modified 且用改过的参数
#[tokio::test]
async fn test_review_modify_runs_edited_args() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "create_task",
            serde_json::json!({"title": "follow up"}),
            "reminder requested",
        ),
        final_answer("Task created."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.6));

    let session = fx.assistant.session(None);
    spawn_reviewer(
        fx.assistant.broker(),
        ReviewDecision::Modify(serde_json::json!({"title": "follow up with vendor"})),
    );
    let result = session.process("remind me about that").await.unwrap();

    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::UserModified);
    assert_eq!(result.outcomes[0].action.args["title"], "follow up with vendor");
    let pending = fx.tasks.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].title, "follow up with vendor");
}

// 迭代预算耗尽：不收敛时正常终止，终态数与迭代数一致
#[tokio::test]
async fn test_iteration_budget_exhausted() {
    let mut config = AppConfig::default();
    config.agent.max_iterations = 3;
    let search = || {
        tool_call(
            "search_emails_rag",
            serde_json::json!({"query": "placement"}),
            "keep digging",
        )
    };
    let decision = MockDecisionClient::scripted([search(), search(), search(), search()]);
    let fx = fixture(config, decision, MockScorer::with_entailment(0.9));

    let session = fx.assistant.session(None);
    let result = session.process("search forever").await.unwrap();

    assert!(!result.completed);
    // 预算耗尽时给出尽力而为的非最终回答
    assert!(result.answer.as_deref().unwrap().contains("ran out of reasoning steps"));
    assert_eq!(result.iterations, 3);
    assert_eq!(result.outcomes.len(), 3);
    assert!(result
        .outcomes
        .iter()
        .all(|o| o.status == OutcomeStatus::Executed));
}

// 连续两次格式非法：恰好产生一条 Rejected 终态，循环继续
#[tokio::test]
async fn test_malformed_decision_yields_single_rejected_outcome() {
    let decision = MockDecisionClient::scripted([
        r#"{"action": "dance"}"#.to_string(),
        r#"{"action": "dance"}"#.to_string(),
        final_answer("Sorry, let me answer directly."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.9));

    let session = fx.assistant.session(None);
    let result = session.process("do something").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Rejected);
    assert!(result.outcomes[0].error.as_deref().unwrap().contains("dance"));
}

// 未知工具：照常评审，执行阶段报 Failed（不会中止会话）
#[tokio::test]
async fn test_unknown_tool_fails_without_aborting() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "teleport_email",
            serde_json::json!({"where": "trash"}),
            "sounds useful",
        ),
        final_answer("That tool does not exist."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.9));

    let session = fx.assistant.session(None);
    let result = session.process("teleport my email").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Failed);
    assert!(result.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("teleport_email"));
}

// 放行的调用带非法参数：校验在任何外部调用之前拦截，终态 Failed，后端无副作用
#[tokio::test]
async fn test_invalid_args_fail_before_any_call() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "create_task",
            serde_json::json!({"title": 42}),
            "user wants a reminder",
        ),
        final_answer("The task arguments were invalid."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.95));

    let session = fx.assistant.session(None);
    let result = session.process("remind me").await.unwrap();

    assert!(result.completed);
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Failed);
    assert!(result.outcomes[0].result.is_none());
    assert!(result.outcomes[0].error.as_deref().unwrap().contains("title"));
    // 任务后端不得被触达
    assert!(fx.tasks.pending().await.unwrap().is_empty());
}

// 评分器不可用时降级为人工复核，绝不自动放行
#[tokio::test]
async fn test_scorer_unavailable_falls_back_to_review() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "search_emails_rag",
            serde_json::json!({"query": "anything"}),
            "look around",
        ),
        final_answer("Done."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::failing());

    let session = fx.assistant.session(None);
    spawn_reviewer(fx.assistant.broker(), ReviewDecision::Approve);
    let result = session.process("check my mail").await.unwrap();

    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.outcomes[0].status, OutcomeStatus::Executed);
    assert_eq!(result.outcomes[0].confidence, 0.0);
}

// 会话历史：每个提议的终态都写回记忆（user / tool / agent 轮次齐全）
#[tokio::test]
async fn test_outcomes_written_back_to_memory() {
    let decision = MockDecisionClient::scripted([
        tool_call(
            "search_emails_rag",
            serde_json::json!({"query": "placement"}),
            "user asked",
        ),
        final_answer("Here is what I found."),
    ]);
    let fx = fixture(AppConfig::default(), decision, MockScorer::with_entailment(0.9));

    let session = fx.assistant.session(None);
    session.process("find placement emails").await.unwrap();

    let memory = session.memory.read().await;
    let roles: Vec<&str> = memory.turns().iter().map(|t| t.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "tool", "agent"]);
    assert!(memory.turns()[1].content.contains("\"status\":\"executed\""));
}
