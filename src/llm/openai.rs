//! OpenAI 兼容 API 后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! OpenAiDecisionClient 实现决策生成；OpenAiScorer 用同一端点做蕴含评分：
//! 提示模型输出 {"entailment","neutral","contradiction"} 的 JSON 概率并归一化。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::{DecisionClient, EntailmentScorer, EntailmentScores};

fn build_client(base_url: Option<&str>, api_key: Option<&str>) -> Client<OpenAIConfig> {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let config = if let Some(url) = base_url {
        OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
    } else {
        OpenAIConfig::new().with_api_key(api_key)
    };
    Client::with_config(config)
}

async fn chat_once(
    client: &Client<OpenAIConfig>,
    model: &str,
    timeout: Duration,
    system: &str,
    user: &str,
) -> Result<String, String> {
    let messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| e.to_string())?,
        ),
        ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user.to_string())
                .build()
                .map_err(|e| e.to_string())?,
        ),
    ];

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .build()
        .map_err(|e| e.to_string())?;

    let response = tokio::time::timeout(timeout, client.chat().create(request))
        .await
        .map_err(|_| format!("request timed out after {}s", timeout.as_secs()))?
        .map_err(|e| e.to_string())?;

    let content = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    Ok(content)
}

/// OpenAI 兼容决策生成器：持有 Client 与 model 名，单次请求带超时
pub struct OpenAiDecisionClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiDecisionClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: build_client(base_url, api_key),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl DecisionClient for OpenAiDecisionClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, String> {
        chat_once(&self.client, &self.model, self.timeout, system, prompt).await
    }
}

const SCORER_SYSTEM: &str = "You are a natural-language-inference scorer. Given a premise and a \
hypothesis, estimate the probability that the premise ENTAILS the hypothesis, is NEUTRAL toward \
it, or CONTRADICTS it. Respond with JSON only: \
{\"entailment\": <0..1>, \"neutral\": <0..1>, \"contradiction\": <0..1>}. \
The three numbers must sum to 1.";

#[derive(Deserialize)]
struct RawScores {
    #[serde(default)]
    entailment: f64,
    #[serde(default)]
    neutral: f64,
    #[serde(default)]
    contradiction: f64,
}

/// 基于提示词的蕴含评分器：让同一 LLM 端点输出三分类概率 JSON
pub struct OpenAiScorer {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiScorer {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: build_client(base_url, api_key),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn parse_scores(text: &str) -> Result<EntailmentScores, String> {
        let trimmed = text.trim();
        // 允许 ```json 围栏或混入其它文本，取第一个 {...} 块
        let json_str = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => return Err(format!("no JSON object in scorer output: {trimmed}")),
        };
        let raw: RawScores = serde_json::from_str(json_str).map_err(|e| e.to_string())?;
        Ok(EntailmentScores {
            entailment: raw.entailment,
            neutral: raw.neutral,
            contradiction: raw.contradiction,
        }
        .normalized())
    }
}

#[async_trait]
impl EntailmentScorer for OpenAiScorer {
    async fn score(&self, premise: &str, hypothesis: &str) -> Result<EntailmentScores, String> {
        let user = format!("Premise:\n{premise}\n\nHypothesis:\n{hypothesis}");
        let content =
            chat_once(&self.client, &self.model, self.timeout, SCORER_SYSTEM, &user).await?;
        Self::parse_scores(&content)
    }
}
