//! 远端连胜服务契约
//!
//! 远端以安装标识为键保存权威连胜值，只接受合法变更：
//! - `new == current + 1`
//! - `new == 0` 且 `current > 0`
//!
//! 其它提交一律拒绝。`bootstrap` 是唯一允许直接设定初值的操作。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FlipStreakError, Result};
use crate::identity::InstallationId;
use crate::streak::Side;

mod http;
mod memory;

pub use http::HttpStreakService;
pub use memory::{InMemoryStreakService, RemoteCall};

/// 提交结果；网络或协议失败走 `Err`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected,
}

/// 判断一次提交在远端当前值下是否合法
pub fn is_legal_transition(current: u32, new_value: u32) -> bool {
    (current.checked_add(1) == Some(new_value)) || (new_value == 0 && current > 0)
}

/// 为一次远端调用加上超时，超时按失败处理
pub(crate) async fn with_timeout<T, F>(limit: Duration, action: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(FlipStreakError::Timeout(format!(
            "{} 超时 ({}ms)",
            action,
            limit.as_millis()
        ))),
    }
}

#[async_trait]
pub trait RemoteStreakService: Send + Sync + std::fmt::Debug {
    /// 建立或确认 标识 ↔ 硬币面 绑定（幂等）
    async fn register(&self, identity: &InstallationId, side: Side) -> Result<()>;

    /// 远端当前连胜值
    async fn fetch_state(&self, identity: &InstallationId) -> Result<u32>;

    /// 远端记录的硬币面（本地丢失绑定时恢复用）
    async fn fetch_locked_side(&self, identity: &InstallationId) -> Result<Option<Side>>;

    /// 提交新的连胜值，远端按合法变更规则接受或拒绝
    async fn submit_streak(&self, identity: &InstallationId, new_value: u32) -> Result<SubmitOutcome>;

    /// 一次性初始化，绕过 +1 / 归零 规则
    async fn bootstrap(&self, identity: &InstallationId, side: Side, initial_value: u32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(is_legal_transition(0, 1));
        assert!(is_legal_transition(5, 6));
        assert!(is_legal_transition(5, 0));
        assert!(!is_legal_transition(0, 0));
        assert!(!is_legal_transition(5, 7));
        assert!(!is_legal_transition(5, 5));
        assert!(!is_legal_transition(5, 4));
        assert!(is_legal_transition(u32::MAX, 0));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, FlipStreakError>(1)
        };
        let err = with_timeout(Duration::from_millis(10), "拉取连胜", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, FlipStreakError::Timeout(_)));

        let fast = async { Ok::<_, FlipStreakError>(7) };
        assert_eq!(with_timeout(Duration::from_millis(10), "拉取连胜", fast).await.unwrap(), 7);
    }
}
