//! SDK 生命周期管理
//!
//! 管理 App 前后台切换等一级生命周期事件，统一触发各模块的状态切换。

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Background,
    Foreground,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Background => "后台",
            Phase::Foreground => "前台",
        }
    }
}

/// 生命周期管理器
#[derive(Default)]
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已注册的 Hook 数量
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// 注册生命周期回调 Hook
    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：App 切换到后台
    pub async fn notify_background(&self) -> Result<()> {
        self.notify(Phase::Background).await
    }

    /// 通知所有 Hook：App 切换到前台
    pub async fn notify_foreground(&self) -> Result<()> {
        self.notify(Phase::Foreground).await
    }

    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续，最后返回第一个错误
    async fn notify(&self, phase: Phase) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到{}", phase.label());

        let mut first_error = None;
        let mut failed = 0usize;
        for (index, hook) in self.hooks.iter().enumerate() {
            let result = match phase {
                Phase::Background => hook.on_background().await,
                Phase::Foreground => hook.on_foreground().await,
            };
            if let Err(e) = result {
                warn!("⚠️ Hook #{} {}切换失败: {}", index, phase.label(), e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Some(e) = first_error {
            warn!(
                "⚠️ {} 个模块{}切换失败，但所有模块都已尝试执行",
                failed,
                phase.label()
            );
            return Err(e);
        }

        info!("✅ 所有模块{}切换完成", phase.label());
        Ok(())
    }
}

// 连胜同步 Hook（SDK 内部自动注册）
mod replay_hook;
pub use replay_hook::StreakReplayHook;
