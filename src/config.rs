//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AEGIS__*` 覆盖（双下划线表示嵌套，
//! 如 `AEGIS__JUDGE__HIGH_THRESHOLD=0.9`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub judge: JudgeSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub memory: MemorySection,
}

/// [app] 段：应用名、对话条数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话内保留的对话条数上限（短期记忆，FIFO 淘汰）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    40
}

/// [agent] 段：迭代预算、上下文窗口、复核超时
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单次查询最大迭代步数，防止死循环
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 每次规划喂给决策生成器与评审器的最近对话条数
    #[serde(default = "default_context_window_turns")]
    pub context_window_turns: usize,
    /// AWAITING_USER 等待复核决定的超时（秒）；不设置则无限等待
    pub review_timeout_secs: Option<u64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_window_turns: default_context_window_turns(),
            review_timeout_secs: None,
        }
    }
}

fn default_max_iterations() -> usize {
    15
}

fn default_context_window_turns() -> usize {
    12
}

/// [judge] 段：三段式裁决阈值与评分器不可用策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeSection {
    /// confidence ≥ high_threshold 时自动执行（只读类工具的基线阈值）
    pub high_threshold: f64,
    /// confidence ≤ low_threshold 时直接拒绝
    pub low_threshold: f64,
    /// 按工具类别覆盖 high_threshold（键：read_only / write / destructive）
    pub category_thresholds: HashMap<String, f64>,
    /// 评分器不可用时的策略："review"（保守，转人工复核）或 "reject"
    pub on_unavailable: String,
}

impl Default for JudgeSection {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            low_threshold: default_low_threshold(),
            category_thresholds: default_category_thresholds(),
            on_unavailable: default_on_unavailable(),
        }
    }
}

fn default_high_threshold() -> f64 {
    0.85
}

fn default_low_threshold() -> f64 {
    0.35
}

fn default_category_thresholds() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("write".to_string(), 0.90);
    m.insert("destructive".to_string(), 0.95);
    m
}

fn default_on_unavailable() -> String {
    "review".to_string()
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [llm] 段：后端与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai（OpenAI 兼容端点）/ mock（无 API Key 时的本地回退）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 单次 LLM 请求超时（秒），决策生成与置信度评分共用
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [memory] 段：会话持久化目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemorySection {
    /// 会话对话历史的存储目录（按 session id 存 JSON）；不设置时不持久化
    pub sessions_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            agent: AgentSection::default(),
            judge: JudgeSection::default(),
            tools: ToolsSection::default(),
            llm: LlmSection::default(),
            memory: MemorySection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 AEGIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AEGIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AEGIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let cfg = AppConfig::default();
        assert!(cfg.judge.low_threshold < cfg.judge.high_threshold);
        assert_eq!(cfg.judge.on_unavailable, "review");
        let destructive = cfg.judge.category_thresholds.get("destructive").copied();
        assert!(destructive.unwrap_or(0.0) > cfg.judge.high_threshold);
    }
}
