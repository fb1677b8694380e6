//! FlipStreak SDK - 离线优先的抛硬币连胜同步 SDK
//!
//! 本 SDK 提供：
//! - 🪙 本地连胜：投掷结果即时生效，不等待网络
//! - 📡 远端同步：合法单步直接提交，离线变化合并为一个目标，恢复后逐步追平
//! - 🔄 启动对账：首次安装或重置后决定本地 / 远端谁是权威
//! - 💾 持久化：sled 键值存储，重启后继续同步
//! - ⚙️ 事件系统：连胜与同步状态变化通过广播通道推送
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flipstreak_sdk::{FlipStreakSDK, ManualNetworkStatusListener, Side, StreakSyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreakSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .server_url("https://streak.example.com/v1")
//!         .build()?;
//!
//!     let network = Arc::new(ManualNetworkStatusListener::online());
//!     let sdk = FlipStreakSDK::initialize(config, network).await?;
//!
//!     sdk.startup().await?;
//!     if sdk.chosen_side().is_none() {
//!         sdk.choose_side(Side::Heads).await?;
//!     }
//!
//!     let streak = sdk.record_flip(Side::Heads).await?;
//!     println!("当前连胜: {}", streak);
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod network;
pub mod remote;
pub mod sdk;
pub mod storage;
pub mod streak;
pub mod sync;
pub mod utils;
pub mod version;

// 重新导出核心类型，方便使用
pub use config::{ConfigError, StreakSyncConfig, StreakSyncConfigBuilder};
pub use error::{FlipStreakError, Result};
pub use events::{EventManager, StreakEvent};
pub use identity::InstallationId;
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use network::{ManualNetworkStatusListener, NetworkStatus, NetworkStatusListener};
pub use remote::{HttpStreakService, InMemoryStreakService, RemoteStreakService, SubmitOutcome};
pub use sdk::{FlipStreakSDK, StartupReport};
pub use storage::{KvBackend, KvStore, MemoryKvStore};
pub use streak::{FlipRecord, LocalStreakStore, Side};
pub use sync::{
    BootstrapOutcome, MutationOutcome, ReplayOutcome, ReplayReport, StreakSyncEngine,
    SyncSnapshot, SyncState,
};
pub use utils::{Clock, ManualClock, SystemClock};
pub use version::SDK_VERSION;
