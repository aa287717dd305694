//! aegis：置信度感知的邮件助理智能体执行核心
//!
//! 每轮循环中，规划器（planner）提议一次工具调用或给出最终回答；行动评审器
//! （judge）用蕴含评分把提议裁决为自动执行、人工复核或拒绝；人工复核闸门
//! （gate）保证所有副作用路径都有确定终态。工具、LLM、邮件索引等远端能力
//! 全部隔在 trait 边界之后，核心可用 mock 后端离线运行。

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
