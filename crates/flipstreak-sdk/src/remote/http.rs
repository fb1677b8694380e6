//! HTTP/JSON 远端连胜服务
//!
//! 路由：
//! - `POST {base}/players/register`            `{identity, side}`
//! - `GET  {base}/players/{identity}/streak`   → `{streak}`
//! - `GET  {base}/players/{identity}/side`     → `{side}`，404 视为无绑定
//! - `POST {base}/players/{identity}/streak`   `{streak}`，409/422 为拒绝
//! - `POST {base}/players/bootstrap`           `{identity, side, streak}`

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::StreakSyncConfig;
use crate::error::{FlipStreakError, Result};
use crate::identity::InstallationId;
use crate::remote::{RemoteStreakService, SubmitOutcome};
use crate::streak::Side;

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    identity: &'a str,
    side: Side,
}

#[derive(Debug, Serialize)]
struct SubmitRequest {
    streak: u32,
}

#[derive(Debug, Serialize)]
struct BootstrapRequest<'a> {
    identity: &'a str,
    side: Side,
    streak: u32,
}

#[derive(Debug, Deserialize)]
struct StreakResponse {
    streak: u32,
}

#[derive(Debug, Deserialize)]
struct SideResponse {
    #[serde(default)]
    side: Option<Side>,
}

/// 提交接口的状态码语义
pub(crate) fn classify_submit_status(status: StatusCode) -> Option<SubmitOutcome> {
    if status.is_success() {
        Some(SubmitOutcome::Accepted)
    } else if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
        Some(SubmitOutcome::Rejected)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct HttpStreakService {
    client: Client,
    base_url: String,
}

impl HttpStreakService {
    pub fn new(config: &StreakSyncConfig) -> Result<Self> {
        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| FlipStreakError::Config("未配置 server_url".to_string()))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| FlipStreakError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ 远端连胜服务客户端已创建 (base_url: {})", base_url);

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn ensure_success(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Self::status_error(response, action).await)
    }

    async fn status_error(response: Response, action: &str) -> FlipStreakError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "无法读取错误信息".to_string());
        error!("❌ {}失败，HTTP 状态码: {}, 错误: {}", action, status, error_text);
        FlipStreakError::Transport(format!(
            "{}失败，HTTP 状态码: {} ({})",
            action, status, error_text
        ))
    }
}

#[async_trait]
impl RemoteStreakService for HttpStreakService {
    async fn register(&self, identity: &InstallationId, side: Side) -> Result<()> {
        let response = self
            .client
            .post(self.url("players/register"))
            .json(&RegisterRequest {
                identity: identity.as_str(),
                side,
            })
            .send()
            .await?;
        Self::ensure_success(response, "注册").await?;
        Ok(())
    }

    async fn fetch_state(&self, identity: &InstallationId) -> Result<u32> {
        let response = self
            .client
            .get(self.url(&format!("players/{}/streak", identity)))
            .send()
            .await?;
        let response = Self::ensure_success(response, "拉取连胜").await?;
        let body: StreakResponse = response
            .json()
            .await
            .map_err(|e| FlipStreakError::InvalidData(format!("解析连胜响应失败: {}", e)))?;
        Ok(body.streak)
    }

    async fn fetch_locked_side(&self, identity: &InstallationId) -> Result<Option<Side>> {
        let response = self
            .client
            .get(self.url(&format!("players/{}/side", identity)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(response, "拉取硬币面").await?;
        let body: SideResponse = response
            .json()
            .await
            .map_err(|e| FlipStreakError::InvalidData(format!("解析硬币面响应失败: {}", e)))?;
        Ok(body.side)
    }

    async fn submit_streak(&self, identity: &InstallationId, new_value: u32) -> Result<SubmitOutcome> {
        let response = self
            .client
            .post(self.url(&format!("players/{}/streak", identity)))
            .json(&SubmitRequest { streak: new_value })
            .send()
            .await?;
        let status = response.status();
        match classify_submit_status(status) {
            Some(outcome) => {
                debug!("提交连胜 {} -> {:?}", new_value, outcome);
                Ok(outcome)
            }
            None => Err(Self::status_error(response, "提交连胜").await),
        }
    }

    async fn bootstrap(&self, identity: &InstallationId, side: Side, initial_value: u32) -> Result<()> {
        let response = self
            .client
            .post(self.url("players/bootstrap"))
            .json(&BootstrapRequest {
                identity: identity.as_str(),
                side,
                streak: initial_value,
            })
            .send()
            .await?;
        Self::ensure_success(response, "bootstrap").await?;
        Ok(())
    }
}
