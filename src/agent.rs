//! 运行时装配
//!
//! 把配置与后端（LLM、邮件索引/存储、日历、任务）装配成 Assistant；
//! 每个会话拿到独立的记忆、独立的工具执行器与独立的取消令牌，复核中介
//! 全局共享，复核者可从任意任务结案。

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::config::{AppConfig, LlmSection};
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::{
    DecisionClient, EntailmentScorer, MockDecisionClient, MockScorer, OpenAiDecisionClient,
    OpenAiScorer,
};
use crate::memory::{InMemoryEmailIndex, IndexedEmail, MemoryManager, SemanticIndex, SessionStore};
use crate::react::{
    agent_loop, ActionJudge, AgentEvent, HitlGate, JudgePolicy, LoopHandles, PendingReview,
    Planner, ProcessResult, ReviewBroker, ReviewDecision,
};
use crate::tools::{
    CalendarClient, CreateEventTool, CreateTaskTool, DeleteEmailTool, EmailRecord, EmailStore,
    GetEmailDetailsTool, InMemoryCalendar, InMemoryEmailStore, InMemoryTasks, KeywordSearchTool,
    ListTasksTool, RecallTool, SearchEmailsTool, TaskClient, ToolExecutor, ToolRegistry,
    UpcomingEventsTool,
};

/// 装配 Assistant 所需的全部后端
pub struct AssistantBackends {
    pub decision: Arc<dyn DecisionClient>,
    pub scorer: Arc<dyn EntailmentScorer>,
    pub index: Arc<dyn SemanticIndex>,
    pub emails: Arc<dyn EmailStore>,
    pub calendar: Arc<dyn CalendarClient>,
    pub tasks: Arc<dyn TaskClient>,
}

/// 按配置选择 LLM 后端；provider = "mock" 或缺少 OPENAI_API_KEY 时回退 mock
pub fn llm_backends(llm: &LlmSection) -> (Arc<dyn DecisionClient>, Arc<dyn EntailmentScorer>) {
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();
    if llm.provider == "mock" || !has_key {
        tracing::warn!("using mock LLM backends (provider=mock or OPENAI_API_KEY unset)");
        return (
            Arc::new(MockDecisionClient::new()),
            Arc::new(MockScorer::with_entailment(0.9)),
        );
    }
    let base_url = llm.base_url.as_deref();
    (
        Arc::new(OpenAiDecisionClient::new(
            base_url,
            &llm.model,
            None,
            llm.request_timeout_secs,
        )),
        Arc::new(OpenAiScorer::new(
            base_url,
            &llm.model,
            None,
            llm.request_timeout_secs,
        )),
    )
}

/// 演示用后端：内存邮件索引/存储 + 空日历 + 空任务表
pub fn demo_backends(llm: &LlmSection) -> AssistantBackends {
    let (decision, scorer) = llm_backends(llm);

    let records = vec![
        EmailRecord {
            id: "m-1001".to_string(),
            subject: "Placement drive next week".to_string(),
            sender: "placement-office@example.edu".to_string(),
            date: "2026-08-24".to_string(),
            body: "The campus placement drive starts Monday. Register by Friday and bring \
                   two copies of your resume."
                .to_string(),
        },
        EmailRecord {
            id: "m-1002".to_string(),
            subject: "Invoice #4417 overdue".to_string(),
            sender: "billing@vendor.example.com".to_string(),
            date: "2026-08-27".to_string(),
            body: "Invoice #4417 for August hosting is overdue. Please arrange payment this week."
                .to_string(),
        },
        EmailRecord {
            id: "m-1003".to_string(),
            subject: "Team offsite agenda".to_string(),
            sender: "manager@example.com".to_string(),
            date: "2026-08-28".to_string(),
            body: "Offsite is on Thursday. Agenda: roadmap review, demos, dinner at 7pm."
                .to_string(),
        },
    ];
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

    AssistantBackends {
        decision,
        scorer,
        index: Arc::new(InMemoryEmailIndex::new(indexed)),
        emails: Arc::new(InMemoryEmailStore::new(records)),
        calendar: Arc::new(InMemoryCalendar::default()),
        tasks: Arc::new(InMemoryTasks::default()),
    }
}

/// 一个活动会话：独立记忆 + 独立取消令牌 + 独立工具执行器
pub struct AgentSession {
    pub id: Uuid,
    pub memory: Arc<RwLock<MemoryManager>>,
    pub supervisor: SessionSupervisor,
    iterations: std::sync::atomic::AtomicUsize,
    handles: LoopHandles,
}

impl AgentSession {
    /// 处理一次用户输入，跑完整个评审循环
    pub async fn process(&self, input: &str) -> Result<ProcessResult, AgentError> {
        let result = agent_loop(&self.handles, self.id, &self.memory, input).await?;
        self.iterations
            .fetch_add(result.iterations, std::sync::atomic::Ordering::Relaxed);
        Ok(result)
    }

    /// 会话累计消耗的迭代步数
    pub fn iterations(&self) -> usize {
        self.iterations.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// 取消会话：循环与挂起中的复核都会尽快退出
    pub fn cancel(&self) {
        self.supervisor.cancel();
    }
}

/// 邮件助理运行时
pub struct Assistant {
    config: AppConfig,
    backends: AssistantBackends,
    broker: Arc<ReviewBroker>,
    sessions: Option<SessionStore>,
}

impl Assistant {
    pub fn new(config: AppConfig, backends: AssistantBackends) -> Self {
        let sessions = config
            .memory
            .sessions_dir
            .as_ref()
            .map(SessionStore::new);
        Self {
            config,
            backends,
            broker: Arc::new(ReviewBroker::new()),
            sessions,
        }
    }

    pub fn broker(&self) -> Arc<ReviewBroker> {
        self.broker.clone()
    }

    /// 当前全部挂起复核项
    pub async fn pending_reviews(&self) -> Vec<PendingReview> {
        self.broker.list_pending().await
    }

    /// 回传复核决定；review_id 未知时返回 false
    pub async fn resolve_review(&self, review_id: Uuid, decision: ReviewDecision) -> bool {
        self.broker.resolve(review_id, decision).await
    }

    /// 新建会话
    pub fn session(&self, event_tx: Option<mpsc::UnboundedSender<AgentEvent>>) -> AgentSession {
        self.build_session(Uuid::new_v4(), Vec::new(), event_tx)
    }

    /// 按 id 恢复会话（配置了 sessions_dir 时从磁盘加载历史）
    pub fn resume_session(
        &self,
        id: Uuid,
        event_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> anyhow::Result<AgentSession> {
        let turns = match &self.sessions {
            Some(store) => store
                .load(id)
                .map_err(|e| AgentError::PersistenceError(e.to_string()))?,
            None => Vec::new(),
        };
        Ok(self.build_session(id, turns, event_tx))
    }

    /// 落盘会话历史；未配置 sessions_dir 时为空操作
    pub async fn save_session(&self, session: &AgentSession) -> anyhow::Result<()> {
        if let Some(store) = &self.sessions {
            let memory = session.memory.read().await;
            store.save(session.id, memory.turns())?;
        }
        Ok(())
    }

    fn build_session(
        &self,
        id: Uuid,
        turns: Vec<crate::memory::ConversationTurn>,
        event_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
    ) -> AgentSession {
        let mut manager = MemoryManager::new(self.config.app.max_context_turns);
        manager.restore(turns);
        let memory = Arc::new(RwLock::new(manager));

        let mut registry = ToolRegistry::new();
        registry.register(SearchEmailsTool::new(self.backends.index.clone()));
        registry.register(KeywordSearchTool::new(self.backends.emails.clone()));
        registry.register(GetEmailDetailsTool::new(self.backends.emails.clone()));
        registry.register(DeleteEmailTool::new(self.backends.emails.clone()));
        registry.register(UpcomingEventsTool::new(self.backends.calendar.clone()));
        registry.register(CreateEventTool::new(self.backends.calendar.clone()));
        registry.register(CreateTaskTool::new(self.backends.tasks.clone()));
        registry.register(ListTasksTool::new(self.backends.tasks.clone()));
        registry.register(RecallTool::new(memory.clone()));
        let executor = ToolExecutor::new(registry, self.config.tools.tool_timeout_secs);

        let supervisor = SessionSupervisor::new();
        let review_timeout = self
            .config
            .agent
            .review_timeout_secs
            .map(std::time::Duration::from_secs);

        let handles = LoopHandles {
            planner: Planner::new(self.backends.decision.clone()),
            judge: ActionJudge::new(
                self.backends.scorer.clone(),
                JudgePolicy::from_config(&self.config.judge),
            ),
            gate: HitlGate::new(self.broker.clone(), review_timeout),
            executor,
            cancel: supervisor.child_token(),
            event_tx,
            max_iterations: self.config.agent.max_iterations,
            context_window_turns: self.config.agent.context_window_turns,
        };

        tracing::info!(session = %id, "session ready");
        AgentSession {
            id,
            memory,
            supervisor,
            iterations: std::sync::atomic::AtomicUsize::new(0),
            handles,
        }
    }
}
