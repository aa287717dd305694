//! aegis 命令行入口
//!
//! 交互式 REPL：每行输入跑一次完整循环；遇到 AWAITING_REVIEW 时在同一终端
//! 提示复核（approve / modify <json> / deny）；Ctrl+C 取消当前会话。

use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use aegis::agent::{demo_backends, Assistant};
use aegis::config::load_config;
use aegis::core::AgentError;
use aegis::react::{AgentEvent, ReviewDecision};

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn parse_review(line: &str) -> Option<ReviewDecision> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("a") || trimmed.eq_ignore_ascii_case("approve") {
        return Some(ReviewDecision::Approve);
    }
    if trimmed.eq_ignore_ascii_case("d") || trimmed.eq_ignore_ascii_case("deny") {
        return Some(ReviewDecision::Deny);
    }
    let rest = trimmed
        .strip_prefix("modify ")
        .or_else(|| trimmed.strip_prefix("m "))?;
    match serde_json::from_str(rest) {
        Ok(args) => Some(ReviewDecision::Modify(args)),
        Err(e) => {
            println!("invalid args JSON: {e}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aegis::observability::init();

    let config = load_config(None).map_err(|e| AgentError::ConfigError(e.to_string()))?;
    let assistant = Assistant::new(config.clone(), demo_backends(&config.llm));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let session = assistant.session(Some(event_tx));
    tracing::info!(session = %session.id, "aegis ready, type a request (exit to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("you> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let mut cancelled = false;
        let mut run = Box::pin(session.process(&input));
        loop {
            tokio::select! {
                result = &mut run => {
                    match result {
                        Ok(outcome) if outcome.completed => {
                            if let Some(answer) = outcome.answer {
                                println!("agent> {answer}");
                            }
                        }
                        Ok(outcome) => {
                            println!(
                                "agent> (no final answer after {} steps, {} action(s) recorded)",
                                outcome.iterations,
                                outcome.outcomes.len()
                            );
                        }
                        Err(e) => {
                            cancelled = matches!(e, AgentError::Cancelled);
                            println!("error> {e}");
                        }
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    session.cancel();
                }
                Some(event) = event_rx.recv() => {
                    match event {
                        AgentEvent::ActionProposed { tool, rationale, .. } => {
                            println!("  .. proposing {tool}: {rationale}");
                        }
                        AgentEvent::Judged { tool, confidence, verdict, .. } => {
                            println!("  .. {tool} judged {verdict} (confidence {confidence:.2})");
                        }
                        AgentEvent::AwaitingReview { review_id, tool, args, rationale, confidence, validation_error } => {
                            println!("review needed for {tool} (confidence {confidence:.2})");
                            println!("  args: {args}");
                            println!("  rationale: {rationale}");
                            if let Some(err) = validation_error {
                                println!("  previous edit rejected: {err}");
                            }
                            loop {
                                prompt("review [a]pprove / m <json> / [d]eny> ");
                                let Some(answer) = lines.next_line().await? else { break };
                                if let Some(decision) = parse_review(&answer) {
                                    assistant.resolve_review(review_id, decision).await;
                                    break;
                                }
                            }
                        }
                        AgentEvent::Outcome { tool, status, error, .. } => {
                            match error {
                                Some(e) => println!("  .. {tool} {status}: {e}"),
                                None => println!("  .. {tool} {status}"),
                            }
                        }
                        AgentEvent::Error { message } => println!("  !! {message}"),
                        AgentEvent::StepUpdate { .. }
                        | AgentEvent::Thinking { .. }
                        | AgentEvent::MessageDone { .. } => {}
                    }
                }
            }
        }

        assistant.save_session(&session).await?;
        if cancelled {
            // 取消令牌是会话级的，取消后该会话不再可用
            break;
        }
    }

    Ok(())
}
