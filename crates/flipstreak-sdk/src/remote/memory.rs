//! 内存版远端连胜服务
//!
//! 严格执行合法变更规则，并支持脚本化故障（离线、失败 N 次、确认丢失、延迟），
//! 供测试与演示使用。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{FlipStreakError, Result};
use crate::identity::InstallationId;
use crate::remote::{is_legal_transition, RemoteStreakService, SubmitOutcome};
use crate::streak::Side;

/// 到达「服务端」的调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Register { identity: String, side: Side },
    FetchState { identity: String },
    FetchLockedSide { identity: String },
    Submit { identity: String, value: u32, outcome: SubmitOutcome },
    Bootstrap { identity: String, value: u32 },
}

#[derive(Debug, Default, Clone)]
struct PlayerRecord {
    side: Option<Side>,
    streak: u32,
}

#[derive(Debug, Default)]
struct Inner {
    players: HashMap<String, PlayerRecord>,
    offline: bool,
    fail_next: u32,
    lose_next_acks: u32,
    failing_value: Option<u32>,
    fail_bootstrap: bool,
    latency: Option<Duration>,
    calls: Vec<RemoteCall>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStreakService {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStreakService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟断网：所有调用返回 NotConnected
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// 接下来 n 次调用返回传输错误
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().fail_next = n;
    }

    /// 接下来 n 次提交在服务端生效，但客户端收不到确认（超时）
    pub fn lose_next_acks(&self, n: u32) {
        self.inner.lock().lose_next_acks = n;
    }

    /// 提交指定值时返回传输错误（不影响其它值）
    pub fn fail_submissions_of(&self, value: Option<u32>) {
        self.inner.lock().failing_value = value;
    }

    /// bootstrap 调用返回传输错误
    pub fn set_bootstrap_failure(&self, fail: bool) {
        self.inner.lock().fail_bootstrap = fail;
    }

    /// 每次调用前的人为延迟
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    /// 带外写入（模拟其它设备或运维修改）
    pub fn force_streak(&self, identity: &InstallationId, value: u32) {
        let mut inner = self.inner.lock();
        inner
            .players
            .entry(identity.as_str().to_string())
            .or_default()
            .streak = value;
    }

    pub fn force_side(&self, identity: &InstallationId, side: Side) {
        let mut inner = self.inner.lock();
        inner
            .players
            .entry(identity.as_str().to_string())
            .or_default()
            .side = Some(side);
    }

    pub fn streak_of(&self, identity: &InstallationId) -> Option<u32> {
        self.inner.lock().players.get(identity.as_str()).map(|p| p.streak)
    }

    pub fn side_of(&self, identity: &InstallationId) -> Option<Side> {
        self.inner
            .lock()
            .players
            .get(identity.as_str())
            .and_then(|p| p.side)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    /// 只取提交记录：(值, 结果)
    pub fn submissions(&self) -> Vec<(u32, SubmitOutcome)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Submit { value, outcome, .. } => Some((*value, *outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    async fn gate(&self) -> Result<()> {
        let latency = self.inner.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.inner.lock();
        if inner.offline {
            return Err(FlipStreakError::NotConnected);
        }
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(FlipStreakError::Transport("模拟的传输失败".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStreakService for InMemoryStreakService {
    async fn register(&self, identity: &InstallationId, side: Side) -> Result<()> {
        self.gate().await?;
        let mut inner = self.inner.lock();
        let record = inner.players.entry(identity.as_str().to_string()).or_default();
        if record.side.is_none() {
            record.side = Some(side);
        }
        inner.calls.push(RemoteCall::Register {
            identity: identity.as_str().to_string(),
            side,
        });
        Ok(())
    }

    async fn fetch_state(&self, identity: &InstallationId) -> Result<u32> {
        self.gate().await?;
        let mut inner = self.inner.lock();
        let streak = inner
            .players
            .get(identity.as_str())
            .map(|p| p.streak)
            .unwrap_or(0);
        inner.calls.push(RemoteCall::FetchState {
            identity: identity.as_str().to_string(),
        });
        Ok(streak)
    }

    async fn fetch_locked_side(&self, identity: &InstallationId) -> Result<Option<Side>> {
        self.gate().await?;
        let mut inner = self.inner.lock();
        let side = inner.players.get(identity.as_str()).and_then(|p| p.side);
        inner.calls.push(RemoteCall::FetchLockedSide {
            identity: identity.as_str().to_string(),
        });
        Ok(side)
    }

    async fn submit_streak(&self, identity: &InstallationId, new_value: u32) -> Result<SubmitOutcome> {
        self.gate().await?;
        let mut inner = self.inner.lock();
        if inner.failing_value == Some(new_value) {
            return Err(FlipStreakError::Transport(format!("模拟的提交失败: {}", new_value)));
        }
        let record = inner.players.entry(identity.as_str().to_string()).or_default();
        let outcome = if is_legal_transition(record.streak, new_value) {
            record.streak = new_value;
            SubmitOutcome::Accepted
        } else {
            SubmitOutcome::Rejected
        };
        debug!("[remote] submit {} -> {:?}", new_value, outcome);
        inner.calls.push(RemoteCall::Submit {
            identity: identity.as_str().to_string(),
            value: new_value,
            outcome,
        });
        if outcome == SubmitOutcome::Accepted && inner.lose_next_acks > 0 {
            inner.lose_next_acks -= 1;
            return Err(FlipStreakError::Timeout("确认丢失".to_string()));
        }
        Ok(outcome)
    }

    async fn bootstrap(&self, identity: &InstallationId, side: Side, initial_value: u32) -> Result<()> {
        self.gate().await?;
        let mut inner = self.inner.lock();
        if inner.fail_bootstrap {
            return Err(FlipStreakError::Transport("模拟的 bootstrap 失败".to_string()));
        }
        let record = inner.players.entry(identity.as_str().to_string()).or_default();
        record.side = Some(side);
        record.streak = initial_value;
        inner.calls.push(RemoteCall::Bootstrap {
            identity: identity.as_str().to_string(),
            value: initial_value,
        });
        Ok(())
    }
}
