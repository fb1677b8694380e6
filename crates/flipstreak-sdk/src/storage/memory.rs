//! 内存 KV 后端，用于单元测试与无持久化场景

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{FlipStreakError, Result};
use crate::storage::{KvBackend, KvOp, KvStats};

#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储写满：之后的写操作全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FlipStreakError::KvStore("存储空间不足".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for MemoryKvStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn apply(&self, ops: Vec<KvOp>) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock();
        for op in ops {
            match op {
                KvOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                KvOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.entries.lock().clear();
        Ok(())
    }

    async fn stats(&self) -> Result<KvStats> {
        let entries = self.entries.lock();
        Ok(KvStats {
            key_count: entries.len() as u64,
            size_bytes: entries.values().map(|v| v.len() as u64).sum(),
        })
    }
}
