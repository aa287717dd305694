//! 决策生成与解析
//!
//! Planner 把 system prompt 与渲染后的上下文交给 DecisionClient，拿回一段
//! 文本后解析为 Decision：要么提议一次工具调用（Action），要么给出最终回答。
//! 解析对 markdown 代码块与前后杂文本宽容；结构性缺陷（tool_call 缺工具名、
//! 空 rationale）一律 MalformedDecision，由循环层决定是否重试。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::DecisionClient;

/// 一次具体的工具调用提议
#[derive(Debug, Clone, serde::Serialize)]
pub struct Action {
    pub tool: String,
    pub args: Value,
    pub rationale: String,
}

/// 规划器的两种产出
#[derive(Debug, Clone)]
pub enum Decision {
    /// 直接给出最终回答，本轮结束
    FinalAnswer(String),
    /// 提议一次工具调用，进入评审
    Propose(Action),
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    tool: Option<String>,
    args: Option<Value>,
    rationale: Option<String>,
    content: Option<String>,
}

/// 从 LLM 输出中截取 JSON 块：优先 ```json 代码栅栏，否则取首个 '{' 到
/// 末个 '}' 的片段
fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(pos) = trimmed.find("```json") {
        let rest = &trimmed[pos + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    if let Some(pos) = trimmed.find("```") {
        let rest = &trimmed[pos + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}

/// 解析 LLM 决策文本
///
/// 纯文本（无 JSON 结构）按最终回答处理；含 JSON 但结构非法时报
/// MalformedDecision。
pub fn parse_decision(text: &str) -> Result<Decision, AgentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AgentError::MalformedDecision("empty response".to_string()));
    }

    let Some(block) = extract_json_block(trimmed) else {
        // 模型偶尔直接说人话；当作最终回答
        return Ok(Decision::FinalAnswer(trimmed.to_string()));
    };

    let raw: RawDecision = match serde_json::from_str(block) {
        Ok(raw) => raw,
        Err(e) => {
            return Err(AgentError::MalformedDecision(format!(
                "invalid decision JSON: {e}"
            )));
        }
    };

    match raw.action.as_str() {
        "final_answer" => {
            let content = raw
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    AgentError::MalformedDecision("final_answer without content".to_string())
                })?;
            Ok(Decision::FinalAnswer(content))
        }
        "tool_call" | "use_tool" => {
            let tool = raw.tool.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
                AgentError::MalformedDecision("tool_call without tool name".to_string())
            })?;
            let rationale = raw
                .rationale
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| {
                    AgentError::MalformedDecision(format!("tool_call {tool} without rationale"))
                })?;
            Ok(Decision::Propose(Action {
                tool,
                args: raw.args.unwrap_or_else(|| Value::Object(Default::default())),
                rationale,
            }))
        }
        other => Err(AgentError::MalformedDecision(format!(
            "unknown action \"{other}\""
        ))),
    }
}

/// 规划器：持有决策客户端与 system prompt 基底
pub struct Planner {
    client: Arc<dyn DecisionClient>,
}

impl Planner {
    pub fn new(client: Arc<dyn DecisionClient>) -> Self {
        Self { client }
    }

    /// 发起一次决策请求，返回原始文本；传输失败映射为 LlmError
    pub async fn decide(&self, system: &str, prompt: &str) -> Result<String, AgentError> {
        self.client
            .complete(system, prompt)
            .await
            .map_err(AgentError::LlmError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call() {
        let text = r#"{"action": "tool_call", "tool": "search_emails_rag",
            "args": {"query": "placement"}, "rationale": "user asked about placements"}"#;
        match parse_decision(text).unwrap() {
            Decision::Propose(action) => {
                assert_eq!(action.tool, "search_emails_rag");
                assert_eq!(action.args["query"], "placement");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_answer() {
        let text = r#"{"action": "final_answer", "content": "You have 2 new emails."}"#;
        match parse_decision(text).unwrap() {
            Decision::FinalAnswer(content) => assert_eq!(content, "You have 2 new emails."),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Sure, here is my decision:\n```json\n{\"action\": \"final_answer\", \"content\": \"done\"}\n```";
        assert!(matches!(
            parse_decision(text).unwrap(),
            Decision::FinalAnswer(_)
        ));
    }

    #[test]
    fn test_plain_text_is_final_answer() {
        match parse_decision("I checked and there is nothing new.").unwrap() {
            Decision::FinalAnswer(content) => assert!(content.contains("nothing new")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_rationale_is_malformed() {
        let text = r#"{"action": "tool_call", "tool": "list_tasks", "args": {}}"#;
        assert!(matches!(
            parse_decision(text),
            Err(AgentError::MalformedDecision(_))
        ));
    }

    #[test]
    fn test_missing_tool_is_malformed() {
        let text = r#"{"action": "tool_call", "rationale": "because"}"#;
        assert!(matches!(
            parse_decision(text),
            Err(AgentError::MalformedDecision(_))
        ));
    }

    #[test]
    fn test_unknown_action_is_malformed() {
        let text = r#"{"action": "dance"}"#;
        assert!(matches!(
            parse_decision(text),
            Err(AgentError::MalformedDecision(_))
        ));
    }

    #[test]
    fn test_legacy_use_tool_accepted() {
        let text = r#"{"action": "use_tool", "tool": "list_tasks", "args": {}, "rationale": "check"}"#;
        assert!(matches!(
            parse_decision(text).unwrap(),
            Decision::Propose(_)
        ));
    }
}
