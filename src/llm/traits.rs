//! 外部模型边界抽象
//!
//! 两个能力接口：DecisionClient（决策生成器，黑盒文本生成，可重提示）与
//! EntailmentScorer（蕴含评分器，纯打分函数，无副作用）。
//! 所有后端（OpenAI 兼容 / Mock）实现这两个 trait；测试用确定性 Mock 替换。

use async_trait::async_trait;

/// 决策生成器：给定 system 指令与累积上下文，产出一段文本
/// （期望为 FINAL_ANSWER 或单个 Action 的 JSON，由 Planner 解析）
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, String>;
}

/// 蕴含评分结果：{ENTAILMENT, NEUTRAL, CONTRADICTION} 上的概率分布
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntailmentScores {
    pub entailment: f64,
    pub neutral: f64,
    pub contradiction: f64,
}

impl EntailmentScores {
    /// 归一化为概率分布；和为 0 时退化为均匀分布
    pub fn normalized(self) -> Self {
        let e = self.entailment.max(0.0);
        let n = self.neutral.max(0.0);
        let c = self.contradiction.max(0.0);
        let sum = e + n + c;
        if sum <= f64::EPSILON {
            return Self {
                entailment: 1.0 / 3.0,
                neutral: 1.0 / 3.0,
                contradiction: 1.0 / 3.0,
            };
        }
        Self {
            entailment: e / sum,
            neutral: n / sum,
            contradiction: c / sum,
        }
    }
}

/// 蕴含评分器：premise（上下文 + 字面参数）与 hypothesis（该行动是否恰当）
/// 返回三分类概率分布；调用失败由 ActionJudge 按策略处理
#[async_trait]
pub trait EntailmentScorer: Send + Sync {
    async fn score(&self, premise: &str, hypothesis: &str) -> Result<EntailmentScores, String>;
}
