use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
    /// 连接中
    Connecting,
    /// 网络受限
    Limited,
}

impl NetworkStatus {
    /// 是否值得尝试访问远端
    pub fn is_reachable(self) -> bool {
        matches!(self, NetworkStatus::Online | NetworkStatus::Limited)
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    pub timestamp: i64,
}

impl NetworkStatusEvent {
    /// 从不可达变为可达
    pub fn is_recovery(&self) -> bool {
        !self.old_status.is_reachable() && self.new_status.is_reachable()
    }
}

/// 网络状态监听器trait（由平台层实现，如 Android/iOS）
#[async_trait]
pub trait NetworkStatusListener: Send + Sync + std::fmt::Debug {
    /// 获取当前网络状态
    async fn get_current_status(&self) -> NetworkStatus;

    /// 开始监听网络状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 网络监控管理器
#[derive(Debug)]
pub struct NetworkMonitor {
    listener: Arc<dyn NetworkStatusListener>,
    status_sender: broadcast::Sender<NetworkStatusEvent>,
    current_status: Arc<tokio::sync::RwLock<NetworkStatus>>,
}

impl NetworkMonitor {
    pub fn new(listener: Arc<dyn NetworkStatusListener>) -> Self {
        let (status_sender, _) = broadcast::channel(100);

        Self {
            listener,
            status_sender,
            current_status: Arc::new(tokio::sync::RwLock::new(NetworkStatus::Offline)),
        }
    }

    /// 启动网络监控：先读取平台当前状态，再转发后续变化
    pub async fn start(&self) -> Result<()> {
        let initial = self.listener.get_current_status().await;
        self.set_status(initial).await;

        let mut receiver = self.listener.start_monitoring().await?;
        let status_sender = self.status_sender.clone();
        let current_status = self.current_status.clone();

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                {
                    let mut status = current_status.write().await;
                    *status = event.new_status;
                }
                debug!(
                    "网络状态变化: {:?} -> {:?}",
                    event.old_status, event.new_status
                );
                let _ = status_sender.send(event);
            }
        });

        Ok(())
    }

    pub async fn stop(&self) {
        self.listener.stop_monitoring().await;
    }

    /// 获取当前网络状态
    pub async fn get_status(&self) -> NetworkStatus {
        *self.current_status.read().await
    }

    /// 手动设置网络状态，状态未变化时不广播
    pub async fn set_status(&self, new_status: NetworkStatus) {
        let old_status = {
            let mut status = self.current_status.write().await;
            let old = *status;
            *status = new_status;
            old
        };
        if old_status == new_status {
            return;
        }

        let event = NetworkStatusEvent {
            old_status,
            new_status,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let _ = self.status_sender.send(event);
    }

    /// 订阅网络状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkStatusEvent> {
        self.status_sender.subscribe()
    }

    /// 检查网络连接（通过网络状态判断）
    pub async fn check_connection(&self) -> bool {
        self.get_status().await.is_reachable()
    }
}

/// 手动控制的网络状态监听器，供没有平台回调的宿主（CLI、测试、演示）使用
#[derive(Debug)]
pub struct ManualNetworkStatusListener {
    status: tokio::sync::RwLock<NetworkStatus>,
    sender: tokio::sync::RwLock<Option<broadcast::Sender<NetworkStatusEvent>>>,
}

impl ManualNetworkStatusListener {
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            status: tokio::sync::RwLock::new(initial),
            sender: tokio::sync::RwLock::new(None),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkStatus::Online)
    }

    /// 切换状态并通知正在监听的 NetworkMonitor
    pub async fn set_status(&self, new_status: NetworkStatus) {
        let old_status = {
            let mut status = self.status.write().await;
            let old = *status;
            *status = new_status;
            old
        };
        if old_status == new_status {
            return;
        }
        if let Some(sender) = self.sender.read().await.as_ref() {
            let _ = sender.send(NetworkStatusEvent {
                old_status,
                new_status,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }
}

#[async_trait]
impl NetworkStatusListener for ManualNetworkStatusListener {
    async fn get_current_status(&self) -> NetworkStatus {
        *self.status.read().await
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>> {
        let (tx, rx) = broadcast::channel(16);
        *self.sender.write().await = Some(tx);
        Ok(rx)
    }

    async fn stop_monitoring(&self) {
        *self.sender.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn monitor_follows_listener() {
        let listener = Arc::new(ManualNetworkStatusListener::online());
        let monitor = NetworkMonitor::new(listener.clone());
        assert!(!monitor.check_connection().await);

        monitor.start().await.unwrap();
        assert!(monitor.check_connection().await);

        let mut rx = monitor.subscribe();
        listener.set_status(NetworkStatus::Offline).await;
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.old_status, NetworkStatus::Online);
        assert_eq!(event.new_status, NetworkStatus::Offline);
        assert!(!monitor.check_connection().await);

        listener.set_status(NetworkStatus::Limited).await;
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.is_recovery());
        assert!(monitor.check_connection().await);
    }

    #[tokio::test]
    async fn unchanged_status_is_not_broadcast() {
        let monitor = NetworkMonitor::new(Arc::new(ManualNetworkStatusListener::online()));
        let mut rx = monitor.subscribe();
        monitor.set_status(NetworkStatus::Offline).await;
        assert!(rx.try_recv().is_err());

        monitor.set_status(NetworkStatus::Connecting).await;
        let event = rx.try_recv().unwrap();
        assert!(!event.is_recovery());
    }
}
