//! 强类型状态存储
//!
//! 值统一以 JSON 编码写入后端。写入按归属分组（连胜 / 同步状态），
//! 每组一次批量提交，保证同组字段不会只写一半。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FlipStreakError, Result};
use crate::identity::InstallationId;
use crate::storage::kv::keys;
use crate::storage::{KvBackend, KvOp};
use crate::streak::{FlipRecord, Side};

/// 启动时一次性加载的全部持久化状态
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub identity: Option<InstallationId>,
    pub side: Option<Side>,
    pub local_streak: u32,
    pub history: Vec<FlipRecord>,
    pub last_acknowledged: Option<u32>,
    pub pending_target: Option<u32>,
    pub needs_bootstrap: bool,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    backend: Arc<dyn KvBackend>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.backend.get_raw(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    FlipStreakError::Serialization(format!("反序列化 {} 失败: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put<V: Serialize>(key: &str, value: &V) -> Result<KvOp> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| FlipStreakError::Serialization(format!("序列化 {} 失败: {}", key, e)))?;
        Ok(KvOp::Put(key.to_string(), bytes))
    }

    fn put_opt<V: Serialize>(key: &str, value: Option<&V>) -> Result<KvOp> {
        match value {
            Some(v) => Self::put(key, v),
            None => Ok(KvOp::Delete(key.to_string())),
        }
    }

    pub async fn load(&self) -> Result<PersistedState> {
        Ok(PersistedState {
            identity: self.get(keys::IDENTITY).await?,
            side: self.get(keys::SIDE).await?,
            local_streak: self.get(keys::LOCAL_STREAK).await?.unwrap_or(0),
            history: self.get(keys::HISTORY).await?.unwrap_or_default(),
            last_acknowledged: self.get(keys::LAST_ACKNOWLEDGED).await?,
            pending_target: self.get(keys::PENDING_TARGET).await?,
            needs_bootstrap: self.get(keys::NEEDS_BOOTSTRAP).await?.unwrap_or(true),
        })
    }

    pub async fn set_identity(&self, identity: &InstallationId) -> Result<()> {
        self.backend.apply(vec![Self::put(keys::IDENTITY, identity)?]).await
    }

    pub async fn set_side(&self, side: Side) -> Result<()> {
        self.backend.apply(vec![Self::put(keys::SIDE, &side)?]).await
    }

    /// 连胜值与投掷记录一起写入
    pub async fn save_streak(&self, value: u32, history: &[FlipRecord]) -> Result<()> {
        self.backend
            .apply(vec![
                Self::put(keys::LOCAL_STREAK, &value)?,
                Self::put(keys::HISTORY, &history)?,
            ])
            .await
    }

    /// 同步引擎状态：最后确认值与待同步目标一起写入
    pub async fn save_sync_state(
        &self,
        last_acknowledged: Option<u32>,
        pending_target: Option<u32>,
    ) -> Result<()> {
        self.backend
            .apply(vec![
                Self::put_opt(keys::LAST_ACKNOWLEDGED, last_acknowledged.as_ref())?,
                Self::put_opt(keys::PENDING_TARGET, pending_target.as_ref())?,
            ])
            .await
    }

    pub async fn needs_bootstrap(&self) -> Result<bool> {
        Ok(self.get(keys::NEEDS_BOOTSTRAP).await?.unwrap_or(true))
    }

    pub async fn set_needs_bootstrap(&self, needed: bool) -> Result<()> {
        self.backend
            .apply(vec![Self::put(keys::NEEDS_BOOTSTRAP, &needed)?])
            .await
    }

    /// 原子清空全部字段（调试重置）
    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear().await
    }
}
