//! 连胜同步生命周期 Hook
//!
//! App 回到前台时补推离线期间积累的连胜变化。

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::sync::{ReplayOutcome, StreakSyncEngine};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct StreakReplayHook {
    engine: Arc<StreakSyncEngine>,
}

impl StreakReplayHook {
    pub fn new(engine: Arc<StreakSyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl LifecycleHook for StreakReplayHook {
    /// 待同步目标已持久化，进入后台无需额外动作
    async fn on_background(&self) -> Result<()> {
        debug!(
            "[Replay Hook] App 切换到后台，待同步目标: {:?}",
            self.engine.pending_target()
        );
        Ok(())
    }

    /// 失败不上报：目标保留，下次触发时再试
    async fn on_foreground(&self) -> Result<()> {
        let report = self.engine.replay_if_needed().await;
        if report.outcome != ReplayOutcome::Idle {
            info!("[Replay Hook] 前台 replay: {:?}", report);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreakSyncConfig;
    use crate::identity::InstallationId;
    use crate::lifecycle::LifecycleManager;
    use crate::remote::InMemoryStreakService;
    use crate::storage::{MemoryKvStore, StateStore};

    #[tokio::test]
    async fn foreground_replays_pending_target() {
        let state = StateStore::new(Arc::new(MemoryKvStore::new()));
        let remote = InMemoryStreakService::new();
        let mut loaded = state.load().await.unwrap();
        loaded.last_acknowledged = Some(0);
        let engine = Arc::new(StreakSyncEngine::new(
            state,
            Arc::new(remote.clone()),
            InstallationId::from("player-1"),
            &StreakSyncConfig::builder().build().unwrap(),
            &loaded,
        ));
        engine.handle_local_mutation(2, false).await;

        let mut manager = LifecycleManager::new();
        manager.register_hook(Arc::new(StreakReplayHook::new(engine.clone())));

        manager.notify_background().await.unwrap();
        assert!(remote.calls().is_empty());

        manager.notify_foreground().await.unwrap();
        assert_eq!(engine.pending_target(), None);
        assert_eq!(remote.streak_of(&InstallationId::from("player-1")), Some(2));
    }
}
