//! Mock 后端（用于测试与无 API Key 的本地回退）
//!
//! MockDecisionClient 按脚本顺序吐出预置回复，耗尽后回落到固定 FINAL_ANSWER；
//! MockScorer 按脚本返回评分分布（或固定分布），可切换为恒定失败以测试
//! JudgeUnavailable 策略。两者均确定性，满足评审幂等性测试。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{DecisionClient, EntailmentScorer, EntailmentScores};

/// 脚本化决策生成器：pop 一条预置回复；脚本耗尽后返回固定 FINAL_ANSWER
pub struct MockDecisionClient {
    script: Mutex<VecDeque<String>>,
    fallback: String,
}

impl MockDecisionClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: r#"{"action": "final_answer", "content": "Mock answer: no model configured.", "rationale": "mock fallback"}"#.to_string(),
        }
    }

    /// 预置回复序列（先进先出）
    pub fn scripted(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let script: VecDeque<String> = responses.into_iter().map(Into::into).collect();
        Self {
            script: Mutex::new(script),
            ..Self::new()
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

impl Default for MockDecisionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionClient for MockDecisionClient {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, String> {
        let mut script = self.script.lock().map_err(|e| e.to_string())?;
        Ok(script.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}

/// 脚本化蕴含评分器：按序返回预置分布，耗尽后返回固定 default 分布
pub struct MockScorer {
    script: Mutex<VecDeque<EntailmentScores>>,
    default: EntailmentScores,
    fail: bool,
}

impl MockScorer {
    /// 恒定返回同一分布
    pub fn constant(scores: EntailmentScores) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: scores,
            fail: false,
        }
    }

    /// 恒定返回指定 entailment 概率（其余均分给 neutral/contradiction）
    pub fn with_entailment(entailment: f64) -> Self {
        let rest = (1.0 - entailment).max(0.0);
        Self::constant(EntailmentScores {
            entailment,
            neutral: rest * 0.8,
            contradiction: rest * 0.2,
        })
    }

    /// 按脚本顺序返回分布，耗尽后回落到 default
    pub fn scripted(scores: impl IntoIterator<Item = EntailmentScores>) -> Self {
        Self {
            script: Mutex::new(scores.into_iter().collect()),
            ..Self::with_entailment(0.9)
        }
    }

    /// 恒定失败（测试 JudgeUnavailable 策略）
    pub fn failing() -> Self {
        let mut mock = Self::with_entailment(0.0);
        mock.fail = true;
        mock
    }
}

#[async_trait]
impl EntailmentScorer for MockScorer {
    async fn score(&self, _premise: &str, _hypothesis: &str) -> Result<EntailmentScores, String> {
        if self.fail {
            return Err("scorer offline".to_string());
        }
        let mut script = self.script.lock().map_err(|e| e.to_string())?;
        Ok(script.pop_front().unwrap_or(self.default).normalized())
    }
}
