//! 可观测性
//!
//! tracing 初始化：默认外部 crate info、本 crate debug（闸门状态迁移走 debug），
//! `RUST_LOG` 可整体覆盖。工具调用与闸门终态的 JSON 审计行
//! （tool_audit / gate_audit）都经由该订阅器输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局日志订阅器
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aegis=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
