//! 行动评审（置信度裁决）
//!
//! ActionJudge 把「对话上下文 + 提议的工具调用」作为前提、「该调用此刻恰当」
//! 作为假设交给 EntailmentScorer，取 ENTAILMENT 概率为置信度，再按工具类别
//! 的阈值表给出三态裁决：自动放行 / 人工复核 / 拒绝。CONTRADICTION 占优时
//! 无条件拒绝。评审本身不可失败：打分器不可用时按配置策略降级，绝不放行。

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::JudgeSection;
use crate::llm::{EntailmentScorer, EntailmentScores};
use crate::memory::{render_turns, ConversationTurn};
use crate::react::planner::Action;
use crate::tools::ToolCategory;

/// 三态裁决
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// 置信度达到类别阈值，免复核执行
    AutoApprove,
    /// 置信度居中，挂起等待人工决定
    NeedsReview,
    /// 置信度过低或上下文矛盾，不执行
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::AutoApprove => "auto_approve",
            Verdict::NeedsReview => "needs_review",
            Verdict::Reject => "reject",
        }
    }
}

/// 占优的蕴含标签
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntailmentLabel {
    Entailment,
    Neutral,
    Contradiction,
}

impl EntailmentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntailmentLabel::Entailment => "entailment",
            EntailmentLabel::Neutral => "neutral",
            EntailmentLabel::Contradiction => "contradiction",
        }
    }

    fn dominant(scores: &EntailmentScores) -> Self {
        if scores.contradiction >= scores.entailment && scores.contradiction >= scores.neutral {
            EntailmentLabel::Contradiction
        } else if scores.entailment >= scores.neutral {
            EntailmentLabel::Entailment
        } else {
            EntailmentLabel::Neutral
        }
    }
}

/// 一次评审结果
#[derive(Debug, Clone)]
pub struct Judgment {
    pub action: Action,
    pub confidence: f64,
    pub verdict: Verdict,
    pub label: EntailmentLabel,
}

/// 打分器不可用时的降级策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnavailablePolicy {
    /// 降级为人工复核（默认）
    Review,
    /// 直接拒绝
    Reject,
}

/// 阈值表：类别覆写 > 基础高阈值；低阈值全局统一
#[derive(Debug, Clone)]
pub struct JudgePolicy {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub category_thresholds: HashMap<String, f64>,
    pub on_unavailable: UnavailablePolicy,
}

impl JudgePolicy {
    pub fn from_config(section: &JudgeSection) -> Self {
        let on_unavailable = match section.on_unavailable.as_str() {
            "reject" => UnavailablePolicy::Reject,
            _ => UnavailablePolicy::Review,
        };
        Self {
            high_threshold: section.high_threshold,
            low_threshold: section.low_threshold,
            category_thresholds: section.category_thresholds.clone(),
            on_unavailable,
        }
    }

    /// 该类别的自动放行阈值
    pub fn high_for(&self, category: ToolCategory) -> f64 {
        self.category_thresholds
            .get(category.as_str())
            .copied()
            .unwrap_or(self.high_threshold)
    }
}

impl Default for JudgePolicy {
    fn default() -> Self {
        let mut category_thresholds = HashMap::new();
        category_thresholds.insert("write".to_string(), 0.90);
        category_thresholds.insert("destructive".to_string(), 0.95);
        Self {
            high_threshold: 0.85,
            low_threshold: 0.35,
            category_thresholds,
            on_unavailable: UnavailablePolicy::Review,
        }
    }
}

/// 纯函数裁决：矛盾优先，其后按阈值分段
fn verdict_for(
    confidence: f64,
    label: EntailmentLabel,
    high: f64,
    low: f64,
) -> Verdict {
    if label == EntailmentLabel::Contradiction {
        return Verdict::Reject;
    }
    if confidence >= high {
        Verdict::AutoApprove
    } else if confidence <= low {
        Verdict::Reject
    } else {
        Verdict::NeedsReview
    }
}

/// 行动评审器
pub struct ActionJudge {
    scorer: Arc<dyn EntailmentScorer>,
    policy: JudgePolicy,
}

impl ActionJudge {
    pub fn new(scorer: Arc<dyn EntailmentScorer>, policy: JudgePolicy) -> Self {
        Self { scorer, policy }
    }

    pub fn policy(&self) -> &JudgePolicy {
        &self.policy
    }

    /// 评审一次行动提议。永不失败：打分器不可用时按 on_unavailable 降级，
    /// 此时置信度记 0.0。
    pub async fn evaluate(
        &self,
        action: Action,
        context: &[ConversationTurn],
        category: ToolCategory,
    ) -> Judgment {
        let premise = format!(
            "{}\nProposed call: {} {}",
            render_turns(context),
            action.tool,
            action.args
        );
        let hypothesis = format!(
            "Calling the tool \"{}\" with these arguments is an appropriate next step \
             for the user's request. Rationale: {}",
            action.tool, action.rationale
        );

        match self.scorer.score(&premise, &hypothesis).await {
            Ok(scores) => {
                let scores = scores.normalized();
                let confidence = scores.entailment;
                let label = EntailmentLabel::dominant(&scores);
                let high = self.policy.high_for(category);
                let verdict = verdict_for(confidence, label, high, self.policy.low_threshold);
                tracing::debug!(
                    tool = %action.tool,
                    confidence,
                    label = label.as_str(),
                    verdict = verdict.as_str(),
                    "judged"
                );
                Judgment {
                    action,
                    confidence,
                    verdict,
                    label,
                }
            }
            Err(e) => {
                let verdict = match self.policy.on_unavailable {
                    UnavailablePolicy::Review => Verdict::NeedsReview,
                    UnavailablePolicy::Reject => Verdict::Reject,
                };
                let err = crate::core::AgentError::JudgeUnavailable(e);
                tracing::warn!(tool = %action.tool, error = %err, verdict = verdict.as_str(), "scoring failed");
                Judgment {
                    action,
                    confidence: 0.0,
                    verdict,
                    label: EntailmentLabel::Neutral,
                }
            }
        }
    }
}
