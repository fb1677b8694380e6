//! 存储模块 - 连胜与同步状态的本地持久化
//!
//! 分两层：
//! - `KvBackend`：字节级键值后端（sled 实现 `KvStore`，测试用 `MemoryKvStore`）
//! - `StateStore`：在后端之上提供强类型读写，所有字段可原子清空

use async_trait::async_trait;

use crate::error::Result;

pub mod kv;
pub mod memory;
pub mod state;

pub use kv::KvStore;
pub use memory::MemoryKvStore;
pub use state::{PersistedState, StateStore};

/// 批量写操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// KV 存储统计信息
#[derive(Debug, Clone, Default)]
pub struct KvStats {
    pub key_count: u64,
    /// 占用的存储字节数（内存后端为值的总长度）
    pub size_bytes: u64,
}

/// 键值后端
///
/// `apply` 必须整体生效或整体失败；`clear` 同样是原子的，
/// 用于调试重置时避免出现「新标识 + 旧连胜」的半清空状态。
#[async_trait]
pub trait KvBackend: Send + Sync + std::fmt::Debug {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn apply(&self, ops: Vec<KvOp>) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<KvStats>;
}
