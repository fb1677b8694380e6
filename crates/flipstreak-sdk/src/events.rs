//! 事件系统模块
//!
//! 连胜变化、同步状态变化、bootstrap 结果通过广播通道推送给 UI 层。
//! 无订阅者时事件直接丢弃，不影响业务流程。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::sync::{BootstrapOutcome, SyncSnapshot};

/// SDK 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreakEvent {
    /// 本地连胜值变化（投掷或权威覆盖）
    StreakChanged { value: u32, timestamp: i64 },
    /// 同步引擎状态变化
    SyncStateChanged { snapshot: SyncSnapshot, timestamp: i64 },
    /// 启动对账结束
    BootstrapFinished { outcome: BootstrapOutcome, timestamp: i64 },
    /// 调试重置后生成了新的安装标识
    IdentityReset { identity: String, timestamp: i64 },
}

impl StreakEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StreakEvent::StreakChanged { .. } => "streak_changed",
            StreakEvent::SyncStateChanged { .. } => "sync_state_changed",
            StreakEvent::BootstrapFinished { .. } => "bootstrap_finished",
            StreakEvent::IdentityReset { .. } => "identity_reset",
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            StreakEvent::StreakChanged { timestamp, .. }
            | StreakEvent::SyncStateChanged { timestamp, .. }
            | StreakEvent::BootstrapFinished { timestamp, .. }
            | StreakEvent::IdentityReset { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 最后事件时间
    pub last_event_time: Option<i64>,
}

/// 事件管理器
#[derive(Debug, Clone)]
pub struct EventManager {
    sender: broadcast::Sender<StreakEvent>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: StreakEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 失败属正常场景
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreakEvent> {
        self.sender.subscribe()
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
