//! 会话监管：生命周期与中断管理
//!
//! 每个会话持有独立 CancellationToken；取消在迭代之间检查（不打断进行中的工具调用），
//! 若会话正悬挂在 AWAITING_USER，由 HITLGate 负责释放挂起的复核标记。

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：取消令牌
#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（调用方 Ctrl+C 或会话废弃）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// 创建子 token（用于单次查询）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
