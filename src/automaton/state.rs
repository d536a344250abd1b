use std::fmt;

use crate::directory::WorkItem;
use crate::error::GradingError;

/// 批改自动机的状态
///
/// Idle → AwaitingSurface → Grading → Advancing → AwaitingSurface ...
///                        ↘ UnitExhausted → CrossingUnit → Idle
/// 任何一步都可能进入 Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomatonState {
    Idle,
    AwaitingSurface,
    Grading,
    Advancing,
    UnitExhausted,
    CrossingUnit,
    Stopped,
}

impl fmt::Display for AutomatonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomatonState::Idle => write!(f, "IDLE"),
            AutomatonState::AwaitingSurface => write!(f, "AWAITING_SURFACE"),
            AutomatonState::Grading => write!(f, "GRADING"),
            AutomatonState::Advancing => write!(f, "ADVANCING"),
            AutomatonState::UnitExhausted => write!(f, "UNIT_EXHAUSTED"),
            AutomatonState::CrossingUnit => write!(f, "CROSSING_UNIT"),
            AutomatonState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// 停止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 操作员清除了运行标志
    Cancelled,
    /// 批改流程错误
    Failed(GradingError),
    /// 与浏览器通信失败
    Browser(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "自动批改已停止"),
            StopReason::Failed(e) => write!(f, "{}", e),
            StopReason::Browser(msg) => write!(f, "浏览器错误: {}", msg),
        }
    }
}

/// 一次运行的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// 没有进行中的自动批改
    Idle,
    /// 页面地址变化，本实例作废，由宿主在新页面上重建
    Navigated,
    /// 已跳转到下一个作业，运行标志保持开启
    CrossedUnit { to: WorkItem },
    /// 所有作业批改完成
    Completed { last: String },
    Stopped(StopReason),
}

impl RunOutcome {
    /// 本次运行是否已经结束（而不是交给新页面继续）
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. } | RunOutcome::Stopped(_))
    }
}

/// 单次轮询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// 等待下一次轮询
    Continue,
    Finished(RunOutcome),
}
