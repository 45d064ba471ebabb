// crates/hc_driver/src/state.rs

//! 驱动状态机
//!
//! ```text
//! Setup ──► Running ──► Finalizing ──► Done
//!   │                      ▲    │
//!   └──────────────────────┘    └────► Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverState {
    /// 初始化内核、构建交换计划
    Setup,
    /// 时间推进
    Running,
    /// 终止所有内核
    Finalizing,
    /// 正常结束
    Done,
    /// 失败结束
    Failed,
}

impl DriverState {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// 是否允许转换到 `next`
    pub fn can_transition_to(self, next: DriverState) -> bool {
        use DriverState::*;
        matches!(
            (self, next),
            (Setup, Running) | (Setup, Finalizing) | (Running, Finalizing) | (Finalizing, Done) | (Finalizing, Failed)
        )
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Setup => "Setup",
            Self::Running => "Running",
            Self::Finalizing => "Finalizing",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(DriverState::Setup.can_transition_to(DriverState::Running));
        assert!(DriverState::Setup.can_transition_to(DriverState::Finalizing));
        assert!(DriverState::Finalizing.can_transition_to(DriverState::Failed));
        assert!(!DriverState::Setup.can_transition_to(DriverState::Done));
        assert!(!DriverState::Running.can_transition_to(DriverState::Failed));
        assert!(!DriverState::Done.can_transition_to(DriverState::Running));
    }

    #[test]
    fn test_terminal() {
        assert!(DriverState::Done.is_terminal());
        assert!(DriverState::Failed.is_terminal());
        assert!(!DriverState::Finalizing.is_terminal());
    }
}
