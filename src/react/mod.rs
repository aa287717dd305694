//! 推理-行动循环
//!
//! planner 产出决策，judge 按置信度裁决，gate 落实人工复核与执行，
//! loop_ 把它们串成每轮一个提议、每个提议一条终态的主循环。

pub mod events;
pub mod gate;
pub mod judge;
pub mod loop_;
pub mod planner;

pub use events::{send_event, AgentEvent};
pub use gate::{
    ExecutionOutcome, HitlGate, OutcomeStatus, PendingReview, ReviewBroker, ReviewDecision,
};
pub use judge::{ActionJudge, EntailmentLabel, JudgePolicy, Judgment, UnavailablePolicy, Verdict};
pub use loop_::{agent_loop, LoopHandles, ProcessResult};
pub use planner::{parse_decision, Action, Decision, Planner};
