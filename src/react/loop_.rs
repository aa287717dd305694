//! 智能体主循环
//!
//! 每轮：取上下文 -> 规划器产出决策 -> 工具调用提议必经评审与闸门 ->
//! 终态写回记忆。final_answer 或迭代预算耗尽时结束。格式非法的决策给一次
//! 纠偏重试，再失败记为一条 Rejected 终态（每个提议恰好一条记录）。

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::AgentError;
use crate::memory::{render_turns, ConversationTurn, MemoryManager};
use crate::react::events::{send_event, AgentEvent};
use crate::react::gate::{ExecutionOutcome, HitlGate, OutcomeStatus};
use crate::react::judge::ActionJudge;
use crate::react::planner::{parse_decision, Action, Decision, Planner};
use crate::tools::{decision_schema_json, ToolCategory, ToolExecutor};

const BASE_SYSTEM_PROMPT: &str = "You are a personal email assistant agent. You work in \
iterations: each reply must be exactly one JSON object, either\n\
{\"action\": \"tool_call\", \"tool\": \"<name>\", \"args\": {...}, \"rationale\": \"<why this call>\"}\n\
or\n\
{\"action\": \"final_answer\", \"content\": \"<your answer to the user>\"}\n\
Rules: always give a concrete rationale for tool calls; never invent tool names; \
prefer search_emails_rag before get_email_details; answer from tool results, not guesses.";

/// 一次用户请求的处理结果
#[derive(Debug)]
pub struct ProcessResult {
    /// 回答文本；预算耗尽时为最后一次工具结果拼成的尽力回答（可能为 None）
    pub answer: Option<String>,
    /// 本轮产生的全部行动终态（与被评审的提议一一对应）
    pub outcomes: Vec<ExecutionOutcome>,
    pub iterations: usize,
    pub completed: bool,
}

/// 循环所需的全部组件（由运行时按会话装配）
pub struct LoopHandles {
    pub planner: Planner,
    pub judge: ActionJudge,
    pub gate: HitlGate,
    pub executor: ToolExecutor,
    pub cancel: CancellationToken,
    pub event_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
    pub max_iterations: usize,
    pub context_window_turns: usize,
}

/// 拼装 system prompt：基底 + 当日日期 + 决策 JSON Schema + 工具清单
fn build_system_prompt(executor: &ToolExecutor) -> String {
    format!(
        "{}\n\nToday is {}.\n\nDecision JSON schema:\n{}\n\nAvailable tools:\n{}",
        BASE_SYSTEM_PROMPT,
        Utc::now().format("%Y-%m-%d"),
        decision_schema_json(),
        executor.schema_json()
    )
}

fn outcome_turn(outcome: &ExecutionOutcome) -> ConversationTurn {
    let body = serde_json::json!({
        "tool": outcome.action.tool,
        "status": outcome.status.as_str(),
        "result": outcome.result,
        "error": outcome.error,
    });
    ConversationTurn::tool(body.to_string())
}

/// 格式两连败时的占位行动，保证每个提议恰好一条终态
fn malformed_placeholder(error: String) -> ExecutionOutcome {
    ExecutionOutcome {
        action: Action {
            tool: String::new(),
            args: Value::Object(Default::default()),
            rationale: String::new(),
        },
        status: OutcomeStatus::Rejected,
        confidence: 0.0,
        result: None,
        error: Some(error),
    }
}

/// 处理一次用户输入，直到 final_answer、预算耗尽或取消。
/// Err 仅在取消与 LLM 传输失败时出现；取消会同时撤销本会话的挂起复核。
pub async fn agent_loop(
    handles: &LoopHandles,
    session_id: Uuid,
    memory: &Arc<RwLock<MemoryManager>>,
    user_input: &str,
) -> Result<ProcessResult, AgentError> {
    memory
        .write()
        .await
        .append(ConversationTurn::user(user_input));

    let system = build_system_prompt(&handles.executor);
    let mut outcomes: Vec<ExecutionOutcome> = Vec::new();

    for iteration in 1..=handles.max_iterations {
        if handles.cancel.is_cancelled() {
            handles.gate.broker().release_session(session_id).await;
            return Err(AgentError::Cancelled);
        }
        send_event(
            &handles.event_tx,
            AgentEvent::StepUpdate {
                iteration,
                max: handles.max_iterations,
            },
        );

        let context: Vec<ConversationTurn> = {
            let mem = memory.read().await;
            mem.recent(handles.context_window_turns).to_vec()
        };
        let prompt = format!(
            "Conversation so far:\n{}\n\nDecide your next action. Reply with exactly one JSON object.",
            render_turns(&context)
        );

        let raw = handles.planner.decide(&system, &prompt).await?;
        send_event(&handles.event_tx, AgentEvent::Thinking { text: raw.clone() });

        let decision = match parse_decision(&raw) {
            Ok(decision) => decision,
            Err(AgentError::MalformedDecision(msg)) => {
                tracing::warn!(error = %msg, "malformed decision, re-prompting once");
                let retry_prompt = format!(
                    "{prompt}\n\nYour previous reply was not a valid decision ({msg}). \
                     Reply again with exactly one JSON object in the decision format."
                );
                let raw = handles.planner.decide(&system, &retry_prompt).await?;
                match parse_decision(&raw) {
                    Ok(decision) => decision,
                    Err(AgentError::MalformedDecision(msg)) => {
                        let outcome = malformed_placeholder(msg.clone());
                        memory.write().await.append(outcome_turn(&outcome));
                        send_event(
                            &handles.event_tx,
                            AgentEvent::Outcome {
                                tool: String::new(),
                                status: outcome.status.as_str().to_string(),
                                result: None,
                                error: Some(msg),
                            },
                        );
                        outcomes.push(outcome);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        match decision {
            Decision::FinalAnswer(content) => {
                memory
                    .write()
                    .await
                    .append(ConversationTurn::agent(content.as_str()));
                send_event(
                    &handles.event_tx,
                    AgentEvent::MessageDone {
                        content: content.clone(),
                    },
                );
                return Ok(ProcessResult {
                    answer: Some(content),
                    outcomes,
                    iterations: iteration,
                    completed: true,
                });
            }
            Decision::Propose(action) => {
                send_event(
                    &handles.event_tx,
                    AgentEvent::ActionProposed {
                        tool: action.tool.clone(),
                        args: action.args.clone(),
                        rationale: action.rationale.clone(),
                    },
                );
                // 未知工具也先过评审；执行阶段自然报 ToolNotFound
                let category = handles
                    .executor
                    .category_of(&action.tool)
                    .unwrap_or(ToolCategory::ReadOnly);
                let judgment = handles.judge.evaluate(action, &context, category).await;
                send_event(
                    &handles.event_tx,
                    AgentEvent::Judged {
                        tool: judgment.action.tool.clone(),
                        confidence: judgment.confidence,
                        verdict: judgment.verdict.as_str().to_string(),
                        label: judgment.label.as_str().to_string(),
                    },
                );

                let outcome = match handles
                    .gate
                    .dispatch(
                        judgment,
                        &handles.executor,
                        session_id,
                        &handles.cancel,
                        &handles.event_tx,
                    )
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        handles.gate.broker().release_session(session_id).await;
                        return Err(e);
                    }
                };

                memory.write().await.append(outcome_turn(&outcome));
                send_event(
                    &handles.event_tx,
                    AgentEvent::Outcome {
                        tool: outcome.action.tool.clone(),
                        status: outcome.status.as_str().to_string(),
                        result: outcome.result.clone(),
                        error: outcome.error.clone(),
                    },
                );
                outcomes.push(outcome);
            }
        }
    }

    tracing::warn!(
        max = handles.max_iterations,
        "iteration budget exhausted without final answer"
    );
    send_event(
        &handles.event_tx,
        AgentEvent::Error {
            message: "iteration budget exhausted".to_string(),
        },
    );
    // 尽力而为：用最后一次成功的工具结果拼一个非最终回答
    let answer = outcomes.iter().rev().find_map(|o| o.result.clone()).map(|r| {
        format!("I ran out of reasoning steps before reaching a final answer. The last tool result was: {r}")
    });
    if let Some(ref content) = answer {
        memory
            .write()
            .await
            .append(ConversationTurn::agent(content.as_str()));
    }
    Ok(ProcessResult {
        answer,
        outcomes,
        iterations: handles.max_iterations,
        completed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_system_prompt_carries_both_schemas() {
        let executor = ToolExecutor::new(ToolRegistry::new(), 5);
        let prompt = build_system_prompt(&executor);
        // 决策格式 schema 与工具清单都要进 system prompt
        assert!(prompt.contains("DecisionFormat"));
        assert!(prompt.contains("Available tools"));
        assert!(prompt.contains("final_answer"));
    }
}
