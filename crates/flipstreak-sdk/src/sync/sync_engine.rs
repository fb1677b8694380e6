/// 连胜同步引擎
///
/// 职责：
/// - 本地连胜变化时尝试直接提交（快速路径）
/// - 记录待同步目标，离线 / 失败后由 replay 逐步追平
/// - 维护远端最后确认值（last acknowledged）
///
/// 远端只接受 `+1` 或归零，所以追平只能一步一步来：
/// 目标低于已确认值时先归零，再从 0 逐步 +1。
/// 同一时间只有一个同步尝试访问远端，其余只更新目标，由正在运行的尝试接手。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::StreakSyncConfig;
use crate::error::Result;
use crate::events::{EventManager, StreakEvent};
use crate::identity::InstallationId;
use crate::remote::{is_legal_transition, with_timeout, RemoteStreakService, SubmitOutcome};
use crate::storage::{PersistedState, StateStore};
use crate::sync::{MutationOutcome, ReplayOutcome, ReplayReport, SyncSnapshot, SyncState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SyncCursor {
    acknowledged: Option<u32>,
    pending: Option<u32>,
}

impl SyncCursor {
    fn set_target(&mut self, target: u32) {
        if self.acknowledged == Some(target) {
            self.pending = None;
        } else {
            self.pending = Some(target);
        }
    }

    /// 更新确认值；只有目标恰好等于确认值时才清除目标
    fn acknowledge(&mut self, value: u32) {
        self.acknowledged = Some(value);
        if self.pending == Some(value) {
            self.pending = None;
        }
    }
}

/// 同步尝试期间置位，用于快照中的 Syncing 状态
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn report(outcome: ReplayOutcome, submissions: u32, resyncs: u32) -> ReplayReport {
    ReplayReport {
        outcome,
        submissions,
        resyncs,
    }
}

/// 持有期间没有同步尝试访问远端
pub(crate) struct SubmissionPause<'a> {
    engine: &'a StreakSyncEngine,
    epoch: u64,
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

impl SubmissionPause<'_> {
    /// 暂停开始后引擎没有被重置
    pub(crate) fn is_current(&self) -> bool {
        self.engine.current_epoch() == self.epoch
    }

    /// 写入远端确认值并结束暂停
    ///
    /// `local_value` 在游标锁内求值，暂停期间到达的投掷不会被覆盖。
    pub(crate) async fn seed(
        self,
        acknowledged: u32,
        local_value: impl FnOnce() -> u32,
    ) -> Result<()> {
        let SubmissionPause {
            engine,
            epoch,
            _guard: guard,
        } = self;
        let result = engine.seed_locked(epoch, acknowledged, local_value).await;
        drop(guard);
        engine.publish().await;
        result
    }
}

/// 连胜同步引擎
#[derive(Debug)]
pub struct StreakSyncEngine {
    state: StateStore,
    remote: Arc<dyn RemoteStreakService>,
    identity: RwLock<InstallationId>,
    request_timeout: Duration,
    max_resyncs: u32,
    cursor: Mutex<SyncCursor>,
    /// 同步锁（同一时间只允许一个同步尝试访问远端）
    sync_lock: tokio::sync::Mutex<()>,
    /// 持久化锁，写入的总是加锁时刻的最新游标
    persist_lock: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
    /// 调试重置时递增，旧纪元的尝试不再写回任何结果
    epoch: AtomicU64,
    events: Option<EventManager>,
}

impl StreakSyncEngine {
    /// 创建同步引擎，游标从持久化状态恢复
    pub fn new(
        state: StateStore,
        remote: Arc<dyn RemoteStreakService>,
        identity: InstallationId,
        config: &StreakSyncConfig,
        loaded: &PersistedState,
    ) -> Self {
        let mut cursor = SyncCursor {
            acknowledged: loaded.last_acknowledged,
            pending: None,
        };
        if let Some(target) = loaded.pending_target {
            cursor.set_target(target);
        }
        Self {
            state,
            remote,
            identity: RwLock::new(identity),
            request_timeout: config.request_timeout(),
            max_resyncs: config.max_resyncs_per_replay,
            cursor: Mutex::new(cursor),
            sync_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    pub fn identity(&self) -> InstallationId {
        self.identity.read().clone()
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.cursor.lock().acknowledged
    }

    pub fn pending_target(&self) -> Option<u32> {
        self.cursor.lock().pending
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let cursor = *self.cursor.lock();
        let state = if self.in_flight.load(Ordering::SeqCst) {
            SyncState::Syncing
        } else if let Some(target) = cursor.pending {
            SyncState::Pending {
                acknowledged: cursor.acknowledged,
                target,
            }
        } else if cursor.acknowledged.is_none() {
            SyncState::Unseeded
        } else {
            SyncState::Synced
        };
        SyncSnapshot {
            last_acknowledged: cursor.acknowledged,
            pending_target: cursor.pending,
            state,
        }
    }

    /// 本地连胜变为 `new_value` 后调用
    ///
    /// 先持久化待同步目标，再视情况提交：
    /// - 离线或远端值未知：只记录目标
    /// - 已有同步在进行：只记录目标，由进行中的尝试接手
    /// - 合法的单步变化：直接提交一次，失败留给 replay
    /// - 其它：当场执行追平
    pub async fn handle_local_mutation(&self, new_value: u32, is_online: bool) -> MutationOutcome {
        let epoch = self.current_epoch();
        if !self.stage_target(epoch, new_value).await {
            return MutationOutcome::Queued;
        }
        self.sync_staged(epoch, is_online).await
    }

    /// 第一阶段：只记录并持久化待同步目标，不访问网络
    pub(crate) async fn stage_target(&self, epoch: u64, new_value: u32) -> bool {
        if !self.commit(epoch, |c| c.set_target(new_value)) {
            return false;
        }
        self.persist(epoch).await;
        true
    }

    /// 第二阶段：按当前游标尝试提交
    pub(crate) async fn sync_staged(&self, epoch: u64, is_online: bool) -> MutationOutcome {
        let cursor = *self.cursor.lock();
        let target = match cursor.pending {
            Some(target) => target,
            None => {
                self.publish().await;
                return MutationOutcome::InSync;
            }
        };
        if !is_online {
            debug!("离线，记录待同步目标: {}", target);
            self.publish().await;
            return MutationOutcome::Queued;
        }
        if cursor.acknowledged.is_none() {
            debug!("远端值未知，等待 bootstrap 后再同步: {}", target);
            self.publish().await;
            return MutationOutcome::Queued;
        }

        loop {
            let guard = match self.sync_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("已有同步在进行，目标 {} 交由其处理", target);
                    return MutationOutcome::Queued;
                }
            };
            let flight = InFlight::enter(&self.in_flight);
            let identity = self.identity();
            let outcome = self.attempt_locked(&identity, epoch).await;
            drop(flight);
            drop(guard);

            // 持锁期间到达、未能拿到锁的新目标由这里接手
            let healthy = match outcome {
                MutationOutcome::Acknowledged => true,
                MutationOutcome::CaughtUp(result) => result.outcome == ReplayOutcome::Converged,
                _ => false,
            };
            if healthy && self.pending_target().is_some() && self.current_epoch() == epoch {
                continue;
            }

            self.publish().await;
            return outcome;
        }
    }

    /// 有待同步目标时追平远端，否则不访问网络
    ///
    /// 适合在启动、回到前台、网络恢复时调用，可重复调用。
    pub async fn replay_if_needed(&self) -> ReplayReport {
        let epoch = self.current_epoch();
        let cursor = *self.cursor.lock();
        if cursor.pending.is_none() {
            return ReplayReport::idle();
        }
        if cursor.acknowledged.is_none() {
            debug!("远端值未知，跳过 replay");
            return report(ReplayOutcome::Deferred, 0, 0);
        }

        let mut result = ReplayReport::idle();
        loop {
            let guard = self.sync_lock.lock().await;
            let flight = InFlight::enter(&self.in_flight);
            let identity = self.identity();
            let round = self.catch_up_locked(&identity, epoch).await;
            drop(flight);
            drop(guard);

            result.outcome = round.outcome;
            result.submissions += round.submissions;
            result.resyncs += round.resyncs;
            // 释放锁之后才到达的目标
            if round.outcome == ReplayOutcome::Converged
                && self.pending_target().is_some()
                && self.current_epoch() == epoch
            {
                continue;
            }
            break;
        }

        match result.outcome {
            ReplayOutcome::Converged => info!(
                "✅ replay 完成: 提交 {} 次，归零 {} 次",
                result.submissions, result.resyncs
            ),
            ReplayOutcome::Deferred => warn!(
                "⚠️ replay 未完成，保留待同步目标: {:?}",
                self.pending_target()
            ),
            ReplayOutcome::Idle => {}
        }
        self.publish().await;
        result
    }

    /// 写入远端确认值（bootstrap / 启动拉取的结果），并按本地值重算待同步目标
    pub async fn seed_acknowledged(&self, acknowledged: u32, local_value: u32) -> Result<()> {
        self.pause_submissions()
            .await
            .seed(acknowledged, || local_value)
            .await
    }

    /// 暂停向远端提交，直到返回的暂停被 `seed` 或丢弃
    ///
    /// 暂停期间本地变化只记录为目标，拉取到的远端值在 `seed` 之前不会被本机改写。
    pub(crate) async fn pause_submissions(&self) -> SubmissionPause<'_> {
        let epoch = self.current_epoch();
        let guard = self.sync_lock.lock().await;
        SubmissionPause {
            engine: self,
            epoch,
            _guard: guard,
        }
    }

    async fn seed_locked(
        &self,
        epoch: u64,
        acknowledged: u32,
        local_value: impl FnOnce() -> u32,
    ) -> Result<()> {
        // 在游标锁内读取本地值：之后到达的投掷一定在这次写入之后暂存目标
        if !self.commit(epoch, |c| {
            c.acknowledged = Some(acknowledged);
            c.set_target(local_value());
        }) {
            return Ok(());
        }
        let _persist = self.persist_lock.lock().await;
        let cursor = {
            let cursor = self.cursor.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return Ok(());
            }
            *cursor
        };
        self.state
            .save_sync_state(cursor.acknowledged, cursor.pending)
            .await?;
        info!(
            "🔄 远端确认值已设定: acknowledged={}, pending={:?}",
            acknowledged, cursor.pending
        );
        Ok(())
    }

    /// 调试重置：丢弃游标并切换到新的安装标识
    ///
    /// 进行中的尝试属于旧纪元，其结果不会再写回。调用方负责清空持久化层。
    pub async fn reset(&self, identity: InstallationId) {
        let _persist = self.persist_lock.lock().await;
        {
            let mut cursor = self.cursor.lock();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            *cursor = SyncCursor::default();
        }
        *self.identity.write() = identity;
        info!("🔄 同步引擎已重置");
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// 纪元未变时才修改游标
    fn commit(&self, epoch: u64, apply: impl FnOnce(&mut SyncCursor)) -> bool {
        let mut cursor = self.cursor.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("纪元已变化，丢弃过期的同步结果");
            return false;
        }
        apply(&mut cursor);
        true
    }

    async fn commit_acknowledged(&self, epoch: u64, value: u32) -> bool {
        if !self.commit(epoch, |c| c.acknowledge(value)) {
            return false;
        }
        self.persist(epoch).await;
        true
    }

    async fn persist(&self, epoch: u64) {
        let _persist = self.persist_lock.lock().await;
        let cursor = {
            let cursor = self.cursor.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            *cursor
        };
        if let Err(e) = self
            .state
            .save_sync_state(cursor.acknowledged, cursor.pending)
            .await
        {
            warn!("⚠️ 同步状态持久化失败: {}", e);
        }
    }

    async fn submit(&self, identity: &InstallationId, value: u32) -> Result<SubmitOutcome> {
        with_timeout(
            self.request_timeout,
            "提交连胜",
            self.remote.submit_streak(identity, value),
        )
        .await
    }

    async fn publish(&self) {
        if let Some(events) = &self.events {
            events
                .emit(StreakEvent::SyncStateChanged {
                    snapshot: self.snapshot(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                })
                .await;
        }
    }

    /// 持有同步锁时调用：合法单步直接提交，否则追平
    async fn attempt_locked(&self, identity: &InstallationId, epoch: u64) -> MutationOutcome {
        let cursor = *self.cursor.lock();
        let (acknowledged, target) = match (cursor.acknowledged, cursor.pending) {
            (_, None) => return MutationOutcome::InSync,
            (None, Some(_)) => return MutationOutcome::Queued,
            (Some(acknowledged), Some(target)) => (acknowledged, target),
        };

        if !is_legal_transition(acknowledged, target) {
            debug!(
                "无法单步提交 {} -> {}，开始追平",
                acknowledged, target
            );
            return MutationOutcome::CaughtUp(self.catch_up_locked(identity, epoch).await);
        }

        match self.submit(identity, target).await {
            Ok(SubmitOutcome::Accepted) => {
                if !self.commit_acknowledged(epoch, target).await {
                    return MutationOutcome::FastPathFailed;
                }
                debug!("✅ 连胜已提交: {}", target);
                // 提交期间又有新的目标
                if self.pending_target().is_some() {
                    let follow_up = self.catch_up_locked(identity, epoch).await;
                    debug!("追加追平: {:?}", follow_up);
                }
                MutationOutcome::Acknowledged
            }
            Ok(SubmitOutcome::Rejected) => {
                warn!(
                    "⚠️ 远端拒绝 {} -> {}，留待 replay",
                    acknowledged, target
                );
                MutationOutcome::FastPathFailed
            }
            Err(e) => {
                warn!("⚠️ 提交连胜 {} 失败，留待 replay: {}", target, e);
                MutationOutcome::FastPathFailed
            }
        }
    }

    /// 逐步追平到最新的待同步目标
    ///
    /// 每一步都重新读取目标，期间到达的新目标会被合并处理。
    /// 步进被拒说明远端与已确认值不一致，此时归零重同步；
    /// 归零次数受 `max_resyncs_per_replay` 限制。
    async fn catch_up_locked(&self, identity: &InstallationId, epoch: u64) -> ReplayReport {
        let mut submissions = 0u32;
        let mut resyncs = 0u32;

        loop {
            if self.current_epoch() != epoch {
                warn!("⚠️ 同步引擎已重置，放弃本次追平");
                return report(ReplayOutcome::Deferred, submissions, resyncs);
            }

            let cursor = *self.cursor.lock();
            let target = match cursor.pending {
                Some(target) => target,
                None => return report(ReplayOutcome::Converged, submissions, resyncs),
            };
            let acknowledged = match cursor.acknowledged {
                Some(acknowledged) => acknowledged,
                None => return report(ReplayOutcome::Deferred, submissions, resyncs),
            };

            if acknowledged == target {
                self.commit_acknowledged(epoch, target).await;
                continue;
            }

            if target == 0 {
                submissions += 1;
                match self.submit(identity, 0).await {
                    // 归零被拒只可能是远端已经是 0
                    Ok(outcome) => {
                        debug!("归零提交结果: {:?}", outcome);
                        if !self.commit_acknowledged(epoch, 0).await {
                            return report(ReplayOutcome::Deferred, submissions, resyncs);
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!("⚠️ 归零提交失败: {}", e);
                        return report(ReplayOutcome::Deferred, submissions, resyncs);
                    }
                }
            }

            if acknowledged < target {
                let step = acknowledged + 1;
                submissions += 1;
                match self.submit(identity, step).await {
                    Ok(SubmitOutcome::Accepted) => {
                        if !self.commit_acknowledged(epoch, step).await {
                            return report(ReplayOutcome::Deferred, submissions, resyncs);
                        }
                        continue;
                    }
                    Ok(SubmitOutcome::Rejected) => {
                        warn!(
                            "⚠️ 远端拒绝步进 {} -> {}，需要归零重同步",
                            acknowledged, step
                        );
                    }
                    Err(e) => {
                        warn!("⚠️ 步进提交 {} 失败: {}", step, e);
                        return report(ReplayOutcome::Deferred, submissions, resyncs);
                    }
                }
            } else {
                debug!(
                    "已确认值 {} 高于目标 {}，需要归零重同步",
                    acknowledged, target
                );
            }

            if resyncs >= self.max_resyncs {
                warn!("⚠️ 归零重同步次数已达上限 ({})", self.max_resyncs);
                return report(ReplayOutcome::Deferred, submissions, resyncs);
            }
            resyncs += 1;
            submissions += 1;
            match self.submit(identity, 0).await {
                Ok(outcome) => {
                    info!("🔄 归零重同步: {:?}", outcome);
                    if !self.commit_acknowledged(epoch, 0).await {
                        return report(ReplayOutcome::Deferred, submissions, resyncs);
                    }
                }
                Err(e) => {
                    warn!("⚠️ 归零重同步失败: {}", e);
                    return report(ReplayOutcome::Deferred, submissions, resyncs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryStreakService, RemoteCall};
    use crate::storage::MemoryKvStore;

    struct Harness {
        engine: Arc<StreakSyncEngine>,
        remote: InMemoryStreakService,
        state: StateStore,
        id: InstallationId,
    }

    async fn harness(config: StreakSyncConfig, acknowledged: Option<u32>) -> Harness {
        let state = StateStore::new(Arc::new(MemoryKvStore::new()));
        let remote = InMemoryStreakService::new();
        let id = InstallationId::from("player-1");
        if let Some(value) = acknowledged {
            remote.force_streak(&id, value);
        }
        let mut loaded = state.load().await.unwrap();
        loaded.last_acknowledged = acknowledged;
        let engine = StreakSyncEngine::new(
            state.clone(),
            Arc::new(remote.clone()),
            id.clone(),
            &config,
            &loaded,
        );
        Harness {
            engine: Arc::new(engine),
            remote,
            state,
            id,
        }
    }

    async fn seeded(acknowledged: u32) -> Harness {
        harness(StreakSyncConfig::builder().build().unwrap(), Some(acknowledged)).await
    }

    #[tokio::test]
    async fn online_fast_path_tracks_every_change() {
        let h = seeded(0).await;
        for value in [1, 2, 3, 0, 1] {
            assert_eq!(
                h.engine.handle_local_mutation(value, true).await,
                MutationOutcome::Acknowledged
            );
            assert_eq!(h.engine.last_acknowledged(), Some(value));
            assert_eq!(h.remote.streak_of(&h.id), Some(value));
        }
        assert_eq!(h.engine.pending_target(), None);
        assert_eq!(h.remote.submissions().len(), 5);

        let persisted = h.state.load().await.unwrap();
        assert_eq!(persisted.last_acknowledged, Some(1));
        assert_eq!(persisted.pending_target, None);
    }

    #[tokio::test]
    async fn offline_changes_coalesce_into_one_target() {
        let h = seeded(0).await;
        for value in [1, 2, 0, 1, 2, 3] {
            assert_eq!(
                h.engine.handle_local_mutation(value, false).await,
                MutationOutcome::Queued
            );
        }
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.engine.pending_target(), Some(3));
        assert_eq!(h.state.load().await.unwrap().pending_target, Some(3));

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(result.resyncs, 0);
        assert_eq!(
            h.remote.submissions().iter().map(|(v, _)| *v).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(h.engine.last_acknowledged(), Some(3));
        assert_eq!(h.engine.pending_target(), None);
    }

    #[tokio::test]
    async fn target_below_acknowledged_resyncs_through_zero() {
        let h = seeded(5).await;
        h.engine.handle_local_mutation(0, false).await;
        h.engine.handle_local_mutation(1, false).await;
        h.engine.handle_local_mutation(2, false).await;

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(result.resyncs, 1);
        assert_eq!(
            h.remote.submissions().iter().map(|(v, _)| *v).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(h.remote.streak_of(&h.id), Some(2));
    }

    #[tokio::test]
    async fn non_adjacent_change_online_catches_up_inline() {
        let h = seeded(1).await;
        h.engine.handle_local_mutation(2, false).await;
        let outcome = h.engine.handle_local_mutation(3, true).await;
        match outcome {
            MutationOutcome::CaughtUp(result) => {
                assert_eq!(result.outcome, ReplayOutcome::Converged);
                assert_eq!(result.submissions, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.remote.streak_of(&h.id), Some(3));
    }

    #[tokio::test]
    async fn replay_without_pending_does_not_touch_network() {
        let h = seeded(4).await;
        for _ in 0..3 {
            assert_eq!(h.engine.replay_if_needed().await, ReplayReport::idle());
        }
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.engine.snapshot().state, SyncState::Synced);
    }

    #[tokio::test]
    async fn change_equal_to_acknowledged_clears_pending() {
        let h = seeded(2).await;
        h.engine.handle_local_mutation(3, false).await;
        assert_eq!(h.engine.pending_target(), Some(3));
        assert_eq!(
            h.engine.handle_local_mutation(2, false).await,
            MutationOutcome::InSync
        );
        assert_eq!(h.engine.pending_target(), None);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_fast_path_leaves_pending_for_replay() {
        let h = seeded(0).await;
        h.remote.fail_next(1);
        assert_eq!(
            h.engine.handle_local_mutation(1, true).await,
            MutationOutcome::FastPathFailed
        );
        assert_eq!(h.engine.pending_target(), Some(1));
        assert_eq!(h.engine.last_acknowledged(), Some(0));

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(h.remote.streak_of(&h.id), Some(1));
    }

    #[tokio::test]
    async fn lost_acknowledgement_is_repaired_by_resync() {
        let h = seeded(2).await;
        // 3 在远端生效，但客户端以为失败
        h.remote.lose_next_acks(1);
        assert_eq!(
            h.engine.handle_local_mutation(3, true).await,
            MutationOutcome::FastPathFailed
        );
        assert_eq!(h.remote.streak_of(&h.id), Some(3));
        assert_eq!(h.engine.last_acknowledged(), Some(2));

        h.engine.handle_local_mutation(4, false).await;
        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(result.resyncs, 1);
        assert_eq!(h.remote.streak_of(&h.id), Some(4));
        assert_eq!(h.engine.last_acknowledged(), Some(4));
    }

    #[tokio::test]
    async fn rejected_zero_means_remote_already_zero() {
        let h = seeded(3).await;
        h.remote.force_streak(&h.id, 0);
        h.engine.handle_local_mutation(0, false).await;

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(h.remote.submissions(), vec![(0, SubmitOutcome::Rejected)]);
        assert_eq!(h.engine.last_acknowledged(), Some(0));
        assert_eq!(h.engine.pending_target(), None);
    }

    #[tokio::test]
    async fn failed_resync_keeps_pending() {
        let h = seeded(3).await;
        h.remote.force_streak(&h.id, 10);
        h.remote.fail_submissions_of(Some(0));
        h.engine.handle_local_mutation(5, false).await;

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Deferred);
        assert_eq!(result.resyncs, 1);
        assert_eq!(h.engine.pending_target(), Some(5));
        assert_eq!(h.engine.last_acknowledged(), Some(3));
        assert_eq!(h.remote.streak_of(&h.id), Some(10));

        h.remote.fail_submissions_of(None);
        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(h.remote.streak_of(&h.id), Some(5));
    }

    #[tokio::test]
    async fn resync_budget_is_enforced() {
        let config = StreakSyncConfig::builder()
            .max_resyncs_per_replay(0)
            .build()
            .unwrap();
        let h = harness(config, Some(3)).await;
        h.engine.handle_local_mutation(1, false).await;

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Deferred);
        assert_eq!(result.submissions, 0);
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.engine.pending_target(), Some(1));
    }

    #[tokio::test]
    async fn slow_remote_times_out_as_failure() {
        let config = StreakSyncConfig::builder()
            .request_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let h = harness(config, Some(0)).await;
        h.remote.set_latency(Some(Duration::from_millis(300)));

        assert_eq!(
            h.engine.handle_local_mutation(1, true).await,
            MutationOutcome::FastPathFailed
        );
        assert_eq!(h.remote.streak_of(&h.id), Some(0));
        assert_eq!(h.engine.pending_target(), Some(1));
    }

    #[tokio::test]
    async fn paused_engine_queues_changes_until_seeded() {
        let h = seeded(2).await;
        let pause = h.engine.pause_submissions().await;

        assert_eq!(
            h.engine.handle_local_mutation(3, true).await,
            MutationOutcome::Queued
        );
        assert!(h.remote.submissions().is_empty());

        // 暂停期间拉取到的远端值仍是 2，本地已经是 3
        assert!(pause.is_current());
        pause.seed(2, || 3).await.unwrap();
        assert_eq!(h.engine.last_acknowledged(), Some(2));
        assert_eq!(h.engine.pending_target(), Some(3));

        let result = h.engine.replay_if_needed().await;
        assert_eq!(result.outcome, ReplayOutcome::Converged);
        assert_eq!(h.remote.streak_of(&h.id), Some(3));
        assert_eq!(h.engine.pending_target(), None);
    }

    #[tokio::test]
    async fn seed_after_reset_is_discarded() {
        let h = seeded(2).await;
        let pause = h.engine.pause_submissions().await;
        h.engine.reset(InstallationId::from("player-2")).await;
        assert!(!pause.is_current());

        pause.seed(7, || 7).await.unwrap();
        assert_eq!(h.engine.last_acknowledged(), None);
        assert_ne!(h.state.load().await.unwrap().last_acknowledged, Some(7));
    }

    #[tokio::test]
    async fn unseeded_engine_only_records_target() {
        let h = harness(StreakSyncConfig::builder().build().unwrap(), None).await;
        assert_eq!(h.engine.snapshot().state, SyncState::Unseeded);

        assert_eq!(
            h.engine.handle_local_mutation(1, true).await,
            MutationOutcome::Queued
        );
        assert_eq!(
            h.engine.replay_if_needed().await.outcome,
            ReplayOutcome::Deferred
        );
        assert!(h.remote.calls().is_empty());

        h.engine.seed_acknowledged(0, 1).await.unwrap();
        assert_eq!(h.engine.pending_target(), Some(1));
        assert_eq!(
            h.engine.replay_if_needed().await.outcome,
            ReplayOutcome::Converged
        );
        assert_eq!(h.remote.streak_of(&h.id), Some(1));
    }

    #[tokio::test]
    async fn seeding_with_matching_local_clears_pending() {
        let h = harness(StreakSyncConfig::builder().build().unwrap(), None).await;
        h.engine.handle_local_mutation(4, false).await;
        h.engine.seed_acknowledged(4, 4).await.unwrap();

        assert_eq!(h.engine.pending_target(), None);
        let persisted = h.state.load().await.unwrap();
        assert_eq!(persisted.last_acknowledged, Some(4));
        assert_eq!(persisted.pending_target, None);
    }

    #[tokio::test]
    async fn concurrent_changes_are_picked_up_by_running_attempt() {
        let h = seeded(0).await;
        h.remote.set_latency(Some(Duration::from_millis(30)));

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.handle_local_mutation(1, true).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.engine.handle_local_mutation(2, true).await;
        h.engine.handle_local_mutation(3, true).await;
        first.await.unwrap();

        // 不论谁先拿到同步锁，最终都追平到最新值
        if h.engine.pending_target().is_some() {
            h.engine.replay_if_needed().await;
        }
        assert_eq!(h.engine.last_acknowledged(), Some(3));
        assert_eq!(h.remote.streak_of(&h.id), Some(3));
        assert!(h
            .remote
            .submissions()
            .iter()
            .all(|(_, outcome)| *outcome == SubmitOutcome::Accepted));
    }

    #[tokio::test]
    async fn reset_discards_cursor_and_switches_identity() {
        let h = seeded(0).await;
        h.engine.handle_local_mutation(1, false).await;
        h.engine.handle_local_mutation(2, false).await;

        let fresh = InstallationId::from("player-2");
        h.engine.reset(fresh.clone()).await;

        assert_eq!(h.engine.identity(), fresh);
        assert_eq!(h.engine.pending_target(), None);
        assert_eq!(h.engine.last_acknowledged(), None);
        assert_eq!(h.engine.replay_if_needed().await, ReplayReport::idle());
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn in_flight_attempt_does_not_outlive_reset() {
        let h = seeded(0).await;
        h.engine.handle_local_mutation(3, false).await;
        h.remote.set_latency(Some(Duration::from_millis(40)));

        let engine = h.engine.clone();
        let replay = tokio::spawn(async move { engine.replay_if_needed().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.engine.reset(InstallationId::from("player-2")).await;
        h.state.clear_all().await.unwrap();

        let result = replay.await.unwrap();
        assert_eq!(result.outcome, ReplayOutcome::Deferred);
        // 至多一次在途提交，之后不再为旧标识提交
        assert!(h.remote.submissions().len() <= 1);
        assert_eq!(h.engine.last_acknowledged(), None);

        let persisted = h.state.load().await.unwrap();
        assert_eq!(persisted.last_acknowledged, None);
        assert_eq!(persisted.pending_target, None);
        assert!(h
            .remote
            .calls()
            .iter()
            .all(|call| matches!(call, RemoteCall::Submit { identity, .. } if identity == "player-1")));
    }

    #[tokio::test]
    async fn pending_target_survives_restart() {
        let h = seeded(2).await;
        h.engine.handle_local_mutation(3, false).await;

        let loaded = h.state.load().await.unwrap();
        let restarted = StreakSyncEngine::new(
            h.state.clone(),
            Arc::new(h.remote.clone()),
            h.id.clone(),
            &StreakSyncConfig::builder().build().unwrap(),
            &loaded,
        );
        assert_eq!(restarted.last_acknowledged(), Some(2));
        assert_eq!(restarted.pending_target(), Some(3));
        assert_eq!(
            restarted.replay_if_needed().await.outcome,
            ReplayOutcome::Converged
        );
    }

    #[tokio::test]
    async fn sync_state_changes_are_broadcast() {
        let events = EventManager::new(16);
        let mut rx = events.subscribe();
        let state = StateStore::new(Arc::new(MemoryKvStore::new()));
        let mut loaded = state.load().await.unwrap();
        loaded.last_acknowledged = Some(0);
        let engine = StreakSyncEngine::new(
            state,
            Arc::new(InMemoryStreakService::new()),
            InstallationId::from("player-1"),
            &StreakSyncConfig::builder().build().unwrap(),
            &loaded,
        )
        .with_events(events);

        engine.handle_local_mutation(1, false).await;
        match rx.recv().await.unwrap() {
            StreakEvent::SyncStateChanged { snapshot, .. } => {
                assert_eq!(
                    snapshot.state,
                    SyncState::Pending {
                        acknowledged: Some(0),
                        target: 1
                    }
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
