//! 统一 SDK 主接口
//!
//! 采用分层架构：
//! - 存储层：`StateStore`（sled / 内存后端）
//! - 领域层：`LocalStreakStore`（屏幕上显示的连胜）
//! - 同步层：`StreakSyncEngine` + `BootstrapReconciler`
//! - 平台层：`NetworkMonitor`、`LifecycleManager`
//! - 事件层：`EventManager`
//!
//! 投掷只写本地，网络交互全部在后台进行，UI 永远不会等待远端。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StreakSyncConfig;
use crate::error::{FlipStreakError, Result};
use crate::events::{EventManager, StreakEvent};
use crate::identity::InstallationId;
use crate::lifecycle::{LifecycleManager, StreakReplayHook};
use crate::network::{NetworkMonitor, NetworkStatus, NetworkStatusListener};
use crate::remote::{with_timeout, HttpStreakService, RemoteStreakService};
use crate::storage::{KvBackend, KvStore, StateStore};
use crate::streak::{FlipRecord, LocalStreakStore, Side};
use crate::sync::{
    BootstrapOutcome, BootstrapReconciler, ReplayReport, StreakSyncEngine, SyncSnapshot,
};
use crate::utils::{Clock, SystemClock};

/// 一次启动流程的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupReport {
    /// 本地丢失硬币面后从远端恢复
    pub side_recovered: bool,
    /// 执行了启动对账时的结果
    pub bootstrap: Option<BootstrapOutcome>,
    /// 启动拉取时采纳的远端值
    pub adopted_remote: Option<u32>,
    pub replay: ReplayReport,
}

pub struct FlipStreakSDK {
    config: StreakSyncConfig,
    state: StateStore,
    remote: Arc<dyn RemoteStreakService>,
    store: Arc<LocalStreakStore>,
    engine: Arc<StreakSyncEngine>,
    reconciler: BootstrapReconciler,
    network: Arc<NetworkMonitor>,
    event_manager: EventManager,
    lifecycle_manager: tokio::sync::RwLock<LifecycleManager>,
    /// 投掷与重置串行执行，保证待同步目标按投掷顺序写入
    flip_lock: tokio::sync::Mutex<()>,
    /// 网络恢复监听任务
    connectivity_task: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for FlipStreakSDK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipStreakSDK")
            .field("identity", &self.engine.identity())
            .field("streak", &self.store.current())
            .field("sync", &self.engine.snapshot())
            .finish()
    }
}

impl FlipStreakSDK {
    /// 使用 HTTP 远端服务初始化（生产配置，需要 `server_url`）
    pub async fn initialize(
        config: StreakSyncConfig,
        network_listener: Arc<dyn NetworkStatusListener>,
    ) -> Result<Arc<Self>> {
        let remote: Arc<dyn RemoteStreakService> = Arc::new(HttpStreakService::new(&config)?);
        Self::initialize_with_remote(config, remote, network_listener).await
    }

    /// 使用自定义远端服务初始化，状态写入 `data_dir/kv`
    pub async fn initialize_with_remote(
        config: StreakSyncConfig,
        remote: Arc<dyn RemoteStreakService>,
        network_listener: Arc<dyn NetworkStatusListener>,
    ) -> Result<Arc<Self>> {
        let backend: Arc<dyn KvBackend> = Arc::new(KvStore::open(&config.kv_dir()).await?);
        Self::initialize_with(
            config,
            backend,
            remote,
            network_listener,
            Arc::new(SystemClock),
        )
        .await
    }

    /// 完全自定义依赖的初始化
    ///
    /// 分层初始化顺序：
    /// 1. 存储层 → 2. 领域层 → 3. 同步层 → 4. 平台层
    pub async fn initialize_with(
        config: StreakSyncConfig,
        backend: Arc<dyn KvBackend>,
        remote: Arc<dyn RemoteStreakService>,
        network_listener: Arc<dyn NetworkStatusListener>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        info!(
            "正在初始化 FlipStreakSDK ({})...",
            crate::version::user_agent()
        );

        // === 第1层：存储 ===
        let state = StateStore::new(backend);
        let loaded = state.load().await?;
        let identity = match loaded.identity.clone() {
            Some(identity) => identity,
            None => {
                let identity = InstallationId::generate();
                state.set_identity(&identity).await?;
                info!("✅ 已生成新的安装标识: {}", identity.short());
                identity
            }
        };

        // === 第2层：本地连胜 ===
        let store = Arc::new(LocalStreakStore::new(
            state.clone(),
            clock,
            config.history_capacity,
            &loaded,
        ));

        // === 第3层：事件与同步 ===
        let event_manager = EventManager::new(config.event_buffer_size);
        let engine = Arc::new(
            StreakSyncEngine::new(state.clone(), remote.clone(), identity, &config, &loaded)
                .with_events(event_manager.clone()),
        );
        let reconciler = BootstrapReconciler::new(
            store.clone(),
            engine.clone(),
            state.clone(),
            remote.clone(),
            &config,
        )
        .with_events(event_manager.clone());

        // === 第4层：网络监控与生命周期 ===
        let network = Arc::new(NetworkMonitor::new(network_listener));
        network.start().await?;

        let mut lifecycle_manager = LifecycleManager::new();
        lifecycle_manager.register_hook(Arc::new(StreakReplayHook::new(engine.clone())));

        let sdk = Arc::new(Self {
            config,
            state,
            remote,
            store,
            engine,
            reconciler,
            network,
            event_manager,
            lifecycle_manager: tokio::sync::RwLock::new(lifecycle_manager),
            flip_lock: tokio::sync::Mutex::new(()),
            connectivity_task: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        });
        sdk.start_connectivity_watch();

        info!(
            "✅ FlipStreakSDK 初始化完成 (identity={}, streak={}, sync={:?})",
            sdk.engine.identity().short(),
            sdk.store.current(),
            sdk.engine.snapshot().state
        );
        Ok(sdk)
    }

    fn check_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(FlipStreakError::NotInitialized(
                "SDK 已关闭".to_string(),
            ));
        }
        Ok(())
    }

    // ========== 查询 ==========

    pub fn identity(&self) -> InstallationId {
        self.engine.identity()
    }

    pub fn chosen_side(&self) -> Option<Side> {
        self.store.chosen_side()
    }

    pub fn streak(&self) -> u32 {
        self.store.current()
    }

    pub fn history(&self) -> Vec<FlipRecord> {
        self.store.history()
    }

    pub fn sync_snapshot(&self) -> SyncSnapshot {
        self.engine.snapshot()
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<StreakEvent> {
        self.event_manager.subscribe()
    }

    pub fn config(&self) -> &StreakSyncConfig {
        &self.config
    }

    pub async fn network_status(&self) -> NetworkStatus {
        self.network.get_status().await
    }

    /// 宿主没有平台网络回调时，手动上报网络状态
    pub async fn set_network_status(&self, status: NetworkStatus) {
        self.network.set_status(status).await;
    }

    // ========== 玩法 ==========

    /// 选定硬币面；远端注册失败不影响本地结果，启动时会再次注册
    ///
    /// 启动对账需要硬币面，新玩家的对账在这里完成。
    pub async fn choose_side(&self, side: Side) -> Result<()> {
        self.check_running()?;
        self.store.choose_side(side).await?;

        if !self.network.check_connection().await {
            return Ok(());
        }
        self.register_quietly(side).await;
        if self.reconciler.is_needed().await? {
            let outcome = self.reconciler.run().await?;
            debug!("选定硬币面后的对账结果: {:?}", outcome);
            // 对账期间的投掷只记录了目标
            self.engine.replay_if_needed().await;
        }
        Ok(())
    }

    /// 记录一次投掷结果，立即返回新的连胜值
    ///
    /// 远端同步在后台进行。
    pub async fn record_flip(&self, outcome: Side) -> Result<u32> {
        self.check_running()?;
        if self.store.chosen_side().is_none() {
            return Err(FlipStreakError::InvalidOperation(
                "尚未选定硬币面".to_string(),
            ));
        }

        let _flip = self.flip_lock.lock().await;
        let value = self.store.record_flip(outcome).await;
        self.event_manager
            .emit(StreakEvent::StreakChanged {
                value,
                timestamp: chrono::Utc::now().timestamp_millis(),
            })
            .await;

        let epoch = self.engine.current_epoch();
        if !self.engine.stage_target(epoch, value).await {
            return Ok(value);
        }
        let is_online = self.network.check_connection().await;
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let outcome = engine.sync_staged(epoch, is_online).await;
            debug!("后台同步结果: {:?}", outcome);
        });
        Ok(value)
    }

    /// 立即追平远端（等待完成）
    pub async fn sync_now(&self) -> Result<ReplayReport> {
        self.check_running()?;
        Ok(self.engine.replay_if_needed().await)
    }

    // ========== 启动流程 ==========

    /// 冷启动时调用
    ///
    /// 顺序：恢复硬币面 → 注册 → 对账（或拉取远端） → replay。
    /// 网络失败只会让对应步骤推迟，不会返回错误。
    pub async fn startup(&self) -> Result<StartupReport> {
        self.check_running()?;
        info!("🔄 开始启动流程");

        let mut report = StartupReport {
            side_recovered: false,
            bootstrap: None,
            adopted_remote: None,
            replay: ReplayReport::idle(),
        };
        let identity = self.engine.identity();

        // 1. 本地丢失硬币面时从远端恢复
        if self.store.chosen_side().is_none() {
            match with_timeout(
                self.config.request_timeout(),
                "拉取硬币面",
                self.remote.fetch_locked_side(&identity),
            )
            .await
            {
                Ok(Some(side)) => {
                    self.store.choose_side(side).await?;
                    report.side_recovered = true;
                    info!("✅ 已从远端恢复硬币面: {}", side);
                }
                Ok(None) => debug!("远端没有硬币面记录"),
                Err(e) => warn!("⚠️ 拉取硬币面失败: {}", e),
            }
        }

        // 2. 确认注册
        if let Some(side) = self.store.chosen_side() {
            self.register_quietly(side).await;
        }

        // 3. 对账，或在没有待同步目标时采纳远端值
        if self.reconciler.is_needed().await? {
            report.bootstrap = Some(self.reconciler.run().await?);
        } else {
            report.adopted_remote = self.adopt_remote().await?;
        }

        // 4. 补推
        report.replay = self.engine.replay_if_needed().await;

        info!("✅ 启动流程完成: {:?}", report);
        Ok(report)
    }

    /// 没有待同步目标时拉取远端值，与本地不同则以远端为准
    ///
    /// 拉取期间暂停提交；期间发生的投掷优先于拉取结果，交给 replay 追平。
    async fn adopt_remote(&self) -> Result<Option<u32>> {
        let paused = self.engine.pause_submissions().await;
        if self.engine.pending_target().is_some() {
            return Ok(None);
        }
        let identity = self.engine.identity();
        let revision = self.store.revision();

        let remote_value = match with_timeout(
            self.config.request_timeout(),
            "拉取远端连胜",
            self.remote.fetch_state(&identity),
        )
        .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 启动拉取远端连胜失败: {}", e);
                return Ok(None);
            }
        };

        if !paused.is_current() {
            return Ok(None);
        }
        let local = self.store.current();
        let adopted = if !self.store.apply_authoritative_at(revision, remote_value).await {
            debug!(
                "拉取期间本地已变化，保留本地连胜 {} (remote={})",
                self.store.current(),
                remote_value
            );
            None
        } else if remote_value != local {
            self.event_manager
                .emit(StreakEvent::StreakChanged {
                    value: remote_value,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                })
                .await;
            Some(remote_value)
        } else {
            None
        };
        paused.seed(remote_value, || self.store.current()).await?;
        Ok(adopted)
    }

    async fn register_quietly(&self, side: Side) {
        let identity = self.engine.identity();
        match with_timeout(
            self.config.request_timeout(),
            "注册",
            self.remote.register(&identity, side),
        )
        .await
        {
            Ok(()) => debug!("✅ 注册完成: {} -> {}", identity.short(), side),
            Err(e) => warn!("⚠️ 注册失败（下次启动重试）: {}", e),
        }
    }

    // ========== 生命周期 ==========

    /// 网络从不可达变为可达时自动 replay
    fn start_connectivity_watch(&self) {
        let mut receiver = self.network.subscribe();
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.is_recovery() => {
                        info!("🔄 网络已恢复，开始 replay");
                        engine.replay_if_needed().await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("网络事件积压，跳过 {} 条", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.connectivity_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// 进入前台：通知所有生命周期 Hook（包括 replay）
    pub async fn enter_foreground(&self) -> Result<()> {
        self.check_running()?;
        info!("应用进入前台");
        self.lifecycle_manager.read().await.notify_foreground().await
    }

    /// 进入后台
    pub async fn enter_background(&self) -> Result<()> {
        self.check_running()?;
        info!("应用进入后台");
        self.lifecycle_manager.read().await.notify_background().await
    }

    /// 宿主自定义的生命周期 Hook
    pub async fn register_lifecycle_hook(&self, hook: Arc<dyn crate::lifecycle::LifecycleHook>) {
        self.lifecycle_manager.write().await.register_hook(hook);
    }

    // ========== 调试 ==========

    /// 调试重置：清空全部本地状态并生成新的安装标识
    ///
    /// 旧标识下进行中的同步结果会被丢弃；下次 `startup` 以新标识重新对账。
    pub async fn full_reset(&self) -> Result<InstallationId> {
        self.check_running()?;
        if !self.config.debug_mode {
            return Err(FlipStreakError::InvalidOperation(
                "full_reset 仅在调试模式可用".to_string(),
            ));
        }

        let _flip = self.flip_lock.lock().await;
        let previous = self.engine.identity();
        let fresh = InstallationId::generate();

        self.engine.reset(fresh.clone()).await;
        self.state.clear_all().await?;
        self.store.discard();
        self.state.set_identity(&fresh).await?;
        self.state.set_needs_bootstrap(true).await?;

        warn!(
            "🔄 调试重置完成: {} -> {}",
            previous.short(),
            fresh.short()
        );
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.event_manager
            .emit(StreakEvent::IdentityReset {
                identity: fresh.to_string(),
                timestamp,
            })
            .await;
        self.event_manager
            .emit(StreakEvent::StreakChanged { value: 0, timestamp })
            .await;
        Ok(fresh)
    }

    /// 关闭 SDK：停止后台监听，之后的调用返回 NotInitialized
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("正在关闭 FlipStreakSDK...");
        if let Some(handle) = self.connectivity_task.lock().take() {
            handle.abort();
        }
        self.network.stop().await;
        info!("FlipStreakSDK 关闭完成");
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Drop for FlipStreakSDK {
    fn drop(&mut self) {
        if let Some(handle) = self.connectivity_task.lock().take() {
            handle.abort();
        }
    }
}
