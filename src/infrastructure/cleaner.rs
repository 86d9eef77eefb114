// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CleanerSettings;
use crate::utils::errors::CleanerError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// 清理服务状态
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanerHealth {
    /// `ready` 或 `loading`
    pub status: String,
    /// 执行设备，`cuda` 或 `cpu`
    pub device: String,
}

impl CleanerHealth {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// 外部图片清理服务客户端
///
/// 把分镜 JPEG 发送给清理服务，服务返回清理后的 JPEG；
/// 任何失败都原样返回输入
#[derive(Debug, Clone)]
pub struct CleanerClient {
    client: reqwest::Client,
    api_url: Url,
    health_url: Url,
}

impl CleanerClient {
    /// 创建客户端
    ///
    /// # 参数
    ///
    /// * `api_url` - 清理接口地址，例如 `http://localhost:8000/clean`
    /// * `timeout` - 清理请求超时
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, CleanerError> {
        let api_url = Url::parse(api_url).map_err(|_| CleanerError::InvalidUrl(api_url.to_string()))?;
        let health_url = health_url_for(&api_url);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            health_url,
        })
    }

    /// 按配置创建，未启用时返回 `None`
    pub fn from_settings(settings: &CleanerSettings) -> Result<Option<Self>, CleanerError> {
        if !settings.enabled {
            return Ok(None);
        }
        Self::new(&settings.api_url, settings.timeout()).map(Some)
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// 清理图片，失败时返回原图
    pub async fn clean(&self, jpeg: Vec<u8>) -> Vec<u8> {
        match self.try_clean(&jpeg).await {
            Ok(cleaned) => cleaned,
            Err(e) => {
                warn!(url = %self.api_url, "Cleaning service unavailable, keeping original: {}", e);
                jpeg
            }
        }
    }

    /// 清理图片
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<u8>)` - 清理后的 JPEG
    /// * `Err(CleanerError)` - 请求失败或服务返回非 200
    pub async fn try_clean(&self, jpeg: &[u8]) -> Result<Vec<u8>, CleanerError> {
        let part = Part::bytes(jpeg.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.api_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(CleanerError::Status(status.as_u16()));
        }

        let cleaned = response.bytes().await?;
        debug!(original = jpeg.len(), cleaned = cleaned.len(), "Panel cleaned");
        Ok(cleaned.to_vec())
    }

    /// 查询服务状态，服务不可达时返回 `None`
    pub async fn health(&self) -> Option<CleanerHealth> {
        let response = self
            .client
            .get(self.health_url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<CleanerHealth>().await.ok()
    }
}

/// `/clean` 对应的 `/health` 地址
fn health_url_for(api_url: &Url) -> Url {
    let mut url = api_url.clone();
    let path = api_url.path();
    let base = path.strip_suffix("/clean").unwrap_or(path.trim_end_matches('/'));
    url.set_path(&format!("{}/health", base));
    url.set_query(None);
    url
}
