//! SDK 配置
//!
//! 与 `StreakSyncConfigBuilder` 配合使用，`build()` 时统一校验。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认保留的最近投掷记录条数
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// 配置校验错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("服务器地址无效: {0}")]
    InvalidServerUrl(String),

    #[error("{field} 不能为 0")]
    ZeroValue { field: &'static str },
}

/// 连胜同步 SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakSyncConfig {
    /// 数据存储目录（sled KV 位于 {data_dir}/kv）
    pub data_dir: PathBuf,
    /// 远端连胜服务地址，如 https://api.flipstreak.app/v1；None 表示由调用方注入自定义实现
    pub server_url: Option<String>,
    /// 单次远端调用超时（毫秒），超时按网络失败处理
    pub request_timeout_ms: u64,
    /// 建连超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 最近投掷记录上限
    pub history_capacity: usize,
    /// 单次重放中允许的最大归零重同步次数
    pub max_resyncs_per_replay: u32,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
    /// 调试模式（允许 full_reset）
    pub debug_mode: bool,
}

impl StreakSyncConfig {
    pub fn builder() -> StreakSyncConfigBuilder {
        StreakSyncConfigBuilder::new()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn kv_dir(&self) -> PathBuf {
        self.data_dir.join("kv")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigError::InvalidServerUrl(url.clone()));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue { field: "request_timeout_ms" });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroValue { field: "history_capacity" });
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::ZeroValue { field: "event_buffer_size" });
        }
        Ok(())
    }
}

impl Default for StreakSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            server_url: None,
            request_timeout_ms: 5_000, // 超时即按失败处理，目标保持 pending
            connect_timeout_ms: 3_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_resyncs_per_replay: 1,
            event_buffer_size: 64,
            debug_mode: false,
        }
    }
}

/// 获取默认数据目录 ~/.flipstreak/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".flipstreak")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        // Windows 支持
        home_dir.join(".flipstreak")
    } else {
        PathBuf::from("./flipstreak_data")
    }
}

/// 配置构建器
pub struct StreakSyncConfigBuilder {
    config: StreakSyncConfig,
}

impl StreakSyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StreakSyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn server_url<S: Into<String>>(mut self, url: S) -> Self {
        let url = url.into();
        self.config.server_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn max_resyncs_per_replay(mut self, max: u32) -> Self {
        self.config.max_resyncs_per_replay = max;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> Result<StreakSyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for StreakSyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
