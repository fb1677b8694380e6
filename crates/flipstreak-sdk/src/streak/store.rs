//! 本地连胜存储
//!
//! 屏幕上显示的连胜值的唯一来源，只接受投掷结果和 bootstrap / 启动拉取时的权威覆盖，
//! 不感知网络状态。

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{FlipStreakError, Result};
use crate::storage::{PersistedState, StateStore};
use crate::streak::{next_streak, FlipRecord, Side};
use crate::utils::Clock;

#[derive(Debug)]
struct StreakInner {
    side: Option<Side>,
    value: u32,
    /// 最新的在最前
    history: VecDeque<FlipRecord>,
    /// 每次修改递增，仅在内存中
    revision: u64,
}

#[derive(Debug)]
pub struct LocalStreakStore {
    state: StateStore,
    clock: Arc<dyn Clock>,
    history_capacity: usize,
    inner: RwLock<StreakInner>,
}

impl LocalStreakStore {
    pub fn new(
        state: StateStore,
        clock: Arc<dyn Clock>,
        history_capacity: usize,
        loaded: &PersistedState,
    ) -> Self {
        let mut history: VecDeque<FlipRecord> = loaded.history.iter().cloned().collect();
        history.truncate(history_capacity);
        Self {
            state,
            clock,
            history_capacity,
            inner: RwLock::new(StreakInner {
                side: loaded.side,
                value: loaded.local_streak,
                history,
                revision: 0,
            }),
        }
    }

    pub fn current(&self) -> u32 {
        self.inner.read().value
    }

    pub fn chosen_side(&self) -> Option<Side> {
        self.inner.read().side
    }

    pub(crate) fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// 最近投掷记录，最新的在最前
    pub fn history(&self) -> Vec<FlipRecord> {
        self.inner.read().history.iter().cloned().collect()
    }

    /// 选定硬币面，一经选定不可更改（同一面重复选择视为成功）
    pub async fn choose_side(&self, side: Side) -> Result<()> {
        match self.chosen_side() {
            Some(existing) if existing == side => return Ok(()),
            Some(existing) => {
                return Err(FlipStreakError::InvalidOperation(format!(
                    "已选定 {}，不能改为 {}",
                    existing, side
                )))
            }
            None => {}
        }
        self.state.set_side(side).await?;
        self.inner.write().side = Some(side);
        info!("🪙 已选定硬币面: {}", side);
        Ok(())
    }

    /// 记录一次投掷结果，返回新的连胜值
    ///
    /// 纯本地操作，不会失败：持久化出错只记日志，内存中的值在本次会话内仍然有效。
    pub async fn record_flip(&self, outcome: Side) -> u32 {
        let (value, history) = {
            let mut inner = self.inner.write();
            let side = match inner.side {
                Some(side) => side,
                None => {
                    warn!("尚未选定硬币面，忽略投掷结果: {}", outcome);
                    return inner.value;
                }
            };
            let value = next_streak(inner.value, side, outcome);
            inner.value = value;
            inner.revision += 1;
            inner.history.push_front(FlipRecord {
                outcome,
                matched: outcome == side,
                streak_after: value,
                at_ms: self.clock.now_millis(),
            });
            inner.history.truncate(self.history_capacity);
            (value, inner.history.iter().cloned().collect::<Vec<_>>())
        };

        debug!("投掷结果: outcome={}, streak={}", outcome, value);
        self.persist(value, &history).await;
        value
    }

    /// 权威覆盖（来自 bootstrap 或启动时的远端拉取）
    pub async fn apply_authoritative(&self, value: u32) {
        self.overwrite(None, value).await;
    }

    /// 自 `revision` 以来本地没有变化时才执行权威覆盖
    ///
    /// 返回 false 表示期间有新的投掷，远端值已过期。
    pub(crate) async fn apply_authoritative_at(&self, revision: u64, value: u32) -> bool {
        self.overwrite(Some(revision), value).await
    }

    async fn overwrite(&self, expected_revision: Option<u64>, value: u32) -> bool {
        let history = {
            let mut inner = self.inner.write();
            if let Some(expected) = expected_revision {
                if inner.revision != expected {
                    debug!(
                        "本地已变化 (revision {} -> {})，放弃覆盖为 {}",
                        expected, inner.revision, value
                    );
                    return false;
                }
            }
            if inner.value == value {
                return true;
            }
            info!("连胜值被远端覆盖: {} -> {}", inner.value, value);
            inner.value = value;
            inner.revision += 1;
            inner.history.iter().cloned().collect::<Vec<_>>()
        };
        self.persist(value, &history).await;
        true
    }

    /// 清零连胜并清空记录
    pub async fn reset(&self) {
        {
            let mut inner = self.inner.write();
            inner.value = 0;
            inner.revision += 1;
            inner.history.clear();
        }
        self.persist(0, &[]).await;
    }

    /// 全量重置后丢弃内存状态（持久化层已由调用方整体清空）
    pub(crate) fn discard(&self) {
        let mut inner = self.inner.write();
        inner.side = None;
        inner.value = 0;
        inner.revision += 1;
        inner.history.clear();
    }

    async fn persist(&self, value: u32, history: &[FlipRecord]) {
        if let Err(e) = self.state.save_streak(value, history).await {
            warn!("⚠️ 连胜持久化失败（本次会话内存值仍有效）: {}", e);
        }
    }
}
