//! KV 存储模块 - 基于 sled 的键值存储
//!
//! 所有状态写在同一个 Tree 内，批量写通过 `apply_batch` 保证原子性。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Db, Tree};

use crate::error::{FlipStreakError, Result};
use crate::storage::{KvBackend, KvOp, KvStats};

const STATE_TREE: &str = "flipstreak_state";

/// sled KV 存储
#[derive(Debug, Clone)]
pub struct KvStore {
    path: PathBuf,
    /// 读写都走 `tree`，这里只用于统计
    db: Arc<Db>,
    tree: Tree,
}

impl KvStore {
    /// 打开（或创建）位于 `path` 的 KV 存储
    pub async fn open(path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| FlipStreakError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // App 冷启动时上一个进程可能刚释放文件锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 6;
        const RETRY_DELAY_MS: u64 = 100;
        let mut last_err: Option<sled::Error> = None;
        let mut db_opt: Option<Db> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(path) {
                Ok(db) => {
                    db_opt = Some(db);
                    break;
                }
                Err(e) => {
                    let msg = e.to_string();
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            FlipStreakError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = db
            .open_tree(STATE_TREE)
            .map_err(|e| FlipStreakError::KvStore(format!("打开状态 Tree 失败: {}", e)))?;

        tracing::info!("✅ KV 存储已打开: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            db: Arc::new(db),
            tree,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| FlipStreakError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl KvBackend for KvStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .tree
            .get(key)
            .map_err(|e| FlipStreakError::KvStore(format!("获取键值对失败: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn apply(&self, ops: Vec<KvOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                KvOp::Put(key, value) => batch.insert(key.as_bytes(), value),
                KvOp::Delete(key) => batch.remove(key.as_bytes()),
            }
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| FlipStreakError::KvStore(format!("批量写入失败: {}", e)))?;
        self.flush().await
    }

    async fn clear(&self) -> Result<()> {
        // Tree::clear 不是原子的，这里收集全部 key 后一次性批量删除
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for key in self.tree.iter().keys() {
            let key = key.map_err(|e| FlipStreakError::KvStore(format!("遍历键失败: {}", e)))?;
            batch.remove(key);
            removed += 1;
        }
        self.tree
            .apply_batch(batch)
            .map_err(|e| FlipStreakError::KvStore(format!("清空状态失败: {}", e)))?;
        self.flush().await?;
        tracing::info!("🧹 KV 状态已清空: {} 个键", removed);
        Ok(())
    }

    async fn stats(&self) -> Result<KvStats> {
        let size_bytes = self
            .db
            .size_on_disk()
            .map_err(|e| FlipStreakError::KvStore(format!("读取存储大小失败: {}", e)))?;
        Ok(KvStats {
            key_count: self.tree.len() as u64,
            size_bytes,
        })
    }
}

/// 持久化键
pub mod keys {
    /// 安装标识
    pub const IDENTITY: &str = "install:identity";
    /// 选定的硬币面
    pub const SIDE: &str = "game:side";
    /// 本地连胜值
    pub const LOCAL_STREAK: &str = "streak:local";
    /// 最近投掷记录
    pub const HISTORY: &str = "streak:history";
    /// 远端最后确认值
    pub const LAST_ACKNOWLEDGED: &str = "sync:last_acknowledged";
    /// 待同步目标值
    pub const PENDING_TARGET: &str = "sync:pending_target";
    /// 是否仍需执行 bootstrap
    pub const NEEDS_BOOTSTRAP: &str = "sync:needs_bootstrap";
}
