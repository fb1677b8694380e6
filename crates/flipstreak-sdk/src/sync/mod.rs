//! 连胜同步模块
//!
//! 职责：
//! - 把本地连胜的每次变化推送到远端（快速路径）
//! - 离线或失败后记录待同步目标，之后逐步追平（+1 步进，必要时先归零）
//! - 首次启动 / 重置后与远端对账（bootstrap）

pub mod bootstrap;
pub mod sync_engine;

pub use bootstrap::BootstrapReconciler;
pub use sync_engine::StreakSyncEngine;

use serde::{Deserialize, Serialize};

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// 尚不知道远端值（bootstrap / 启动拉取之前）
    Unseeded,
    /// 已同步
    Synced,
    /// 有待同步目标
    Pending {
        acknowledged: Option<u32>,
        target: u32,
    },
    /// 正在与远端交互
    Syncing,
}

/// 同步引擎的当前快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// 远端最后确认的值
    pub last_acknowledged: Option<u32>,
    /// 尚未确认的目标值
    pub pending_target: Option<u32>,
    pub state: SyncState,
}

/// 一次 replay 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayOutcome {
    /// 没有待同步目标，未访问网络
    Idle,
    /// 远端已追平
    Converged,
    /// 本次未能追平，待同步目标保留
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub outcome: ReplayOutcome,
    /// 本次发出的提交次数（含归零）
    pub submissions: u32,
    /// 本次执行的归零重同步次数
    pub resyncs: u32,
}

impl ReplayReport {
    pub(crate) fn idle() -> Self {
        Self {
            outcome: ReplayOutcome::Idle,
            submissions: 0,
            resyncs: 0,
        }
    }
}

/// 本地变化触发的同步尝试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// 新值已与远端一致
    InSync,
    /// 只记录了待同步目标（离线 / 远端值未知 / 已有同步在进行）
    Queued,
    /// 快速路径提交成功
    Acknowledged,
    /// 快速路径失败或被拒，留给之后的 replay
    FastPathFailed,
    /// 无法走快速路径，当场执行了追平
    CaughtUp(ReplayReport),
}

/// 启动对账结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapOutcome {
    /// 远端为 0、本地有连胜：用本地值初始化了远端
    Migrated { value: u32 },
    /// 采纳远端值覆盖本地
    Overridden { value: u32 },
    /// 本次未完成，下次启动重试
    Deferred,
}
