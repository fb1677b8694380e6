//! 启动对账（Bootstrap）
//!
//! 全新安装或调试重置后执行一次，决定本地与远端谁是权威：
//! - 远端为 0 且本地有连胜：用本地值初始化远端（迁移旧版本数据）
//! - 其它情况：远端为准，覆盖本地
//!
//! 未完成（拉取失败 / bootstrap 失败 / 尚未选定硬币面）时保留标记，下次启动重试。
//! 本层不做重试，重试时机由生命周期层决定。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::StreakSyncConfig;
use crate::error::Result;
use crate::events::{EventManager, StreakEvent};
use crate::remote::{with_timeout, RemoteStreakService};
use crate::storage::StateStore;
use crate::streak::LocalStreakStore;
use crate::sync::{BootstrapOutcome, StreakSyncEngine};

#[derive(Debug)]
pub struct BootstrapReconciler {
    store: Arc<LocalStreakStore>,
    engine: Arc<StreakSyncEngine>,
    state: StateStore,
    remote: Arc<dyn RemoteStreakService>,
    request_timeout: Duration,
    events: Option<EventManager>,
}

impl BootstrapReconciler {
    pub fn new(
        store: Arc<LocalStreakStore>,
        engine: Arc<StreakSyncEngine>,
        state: StateStore,
        remote: Arc<dyn RemoteStreakService>,
        config: &StreakSyncConfig,
    ) -> Self {
        Self {
            store,
            engine,
            state,
            remote,
            request_timeout: config.request_timeout(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventManager) -> Self {
        self.events = Some(events);
        self
    }

    /// 是否还需要对账
    pub async fn is_needed(&self) -> Result<bool> {
        self.state.needs_bootstrap().await
    }

    /// 执行一次对账
    ///
    /// 只有持久化失败才返回错误；网络失败表现为 `Deferred`。
    pub async fn run(&self) -> Result<BootstrapOutcome> {
        let side = match self.store.chosen_side() {
            Some(side) => side,
            None => {
                debug!("尚未选定硬币面，推迟 bootstrap");
                return Ok(self.finish(BootstrapOutcome::Deferred).await);
            }
        };
        // 对账期间暂停提交：拉取到的远端值在写入确认值之前不会被本机改写
        let paused = self.engine.pause_submissions().await;
        let identity = self.engine.identity();
        let local = self.store.current();
        let revision = self.store.revision();

        info!(
            "🔄 开始 bootstrap: identity={}, side={}, local={}",
            identity.short(),
            side,
            local
        );

        let remote_value = match with_timeout(
            self.request_timeout,
            "拉取远端连胜",
            self.remote.fetch_state(&identity),
        )
        .await
        {
            Ok(value) => value,
            Err(e) => {
                // 拉取失败时先假定远端与本地一致，标记保留，下次启动再对账
                warn!("⚠️ bootstrap 拉取远端连胜失败: {}", e);
                paused.seed(local, || self.store.current()).await?;
                return Ok(self.finish(BootstrapOutcome::Deferred).await);
            }
        };

        if remote_value == 0 && local > 0 {
            return match with_timeout(
                self.request_timeout,
                "bootstrap",
                self.remote.bootstrap(&identity, side, local),
            )
            .await
            {
                Ok(()) => {
                    let current = paused.is_current();
                    paused.seed(local, || self.store.current()).await?;
                    if !current {
                        return Ok(self.finish(BootstrapOutcome::Deferred).await);
                    }
                    self.state.set_needs_bootstrap(false).await?;
                    info!("✅ bootstrap 完成，本地连胜 {} 已写入远端", local);
                    Ok(self.finish(BootstrapOutcome::Migrated { value: local }).await)
                }
                Err(e) => {
                    warn!("⚠️ bootstrap 写入远端失败: {}", e);
                    paused.seed(0, || self.store.current()).await?;
                    Ok(self.finish(BootstrapOutcome::Deferred).await)
                }
            };
        }

        // 拉取期间有新的投掷：远端值已过期，不覆盖本地，由 replay 追平，下次启动再对账
        if !paused.is_current() || !self.store.apply_authoritative_at(revision, remote_value).await
        {
            warn!(
                "⚠️ 拉取远端连胜期间本地已变化，推迟 bootstrap (remote={})",
                remote_value
            );
            paused.seed(remote_value, || self.store.current()).await?;
            return Ok(self.finish(BootstrapOutcome::Deferred).await);
        }
        if remote_value != local {
            self.emit(StreakEvent::StreakChanged {
                value: remote_value,
                timestamp: chrono::Utc::now().timestamp_millis(),
            })
            .await;
        }
        paused.seed(remote_value, || self.store.current()).await?;
        self.state.set_needs_bootstrap(false).await?;
        info!("✅ bootstrap 完成，采用远端连胜 {}", remote_value);
        Ok(self
            .finish(BootstrapOutcome::Overridden {
                value: remote_value,
            })
            .await)
    }

    async fn finish(&self, outcome: BootstrapOutcome) -> BootstrapOutcome {
        self.emit(StreakEvent::BootstrapFinished {
            outcome,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
        .await;
        outcome
    }

    async fn emit(&self, event: StreakEvent) {
        if let Some(events) = &self.events {
            events.emit(event).await;
        }
    }
}
