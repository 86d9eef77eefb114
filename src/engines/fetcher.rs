// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::engines::error_handler::ErrorHandler;
use crate::engines::traits::{FetchRequest, FetchedImage, ImageFetcher};
use crate::infrastructure::observability::collector::MetricsCollector;
use crate::utils::errors::FetchError;
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 轮换使用的 User-Agent
pub const USER_AGENTS: [&str; 7] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
];

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/png,image/*;q=0.8,*/*;q=0.5";

/// 随机选择一个 User-Agent
pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::random_range(0..USER_AGENTS.len())]
}

/// 弹性图片下载器
///
/// 每次尝试使用新的 User-Agent；首次尝试允许 HTTP/2，
/// 之后降级为 HTTP/1.1 以绕过协议层面的拦截
pub struct ResilientFetcher {
    /// 允许 HTTP/2 的客户端
    multiplexed: reqwest::Client,
    /// 仅 HTTP/1.1 的客户端
    fallback: reqwest::Client,
    policy: RetryPolicy,
    errors: Arc<ErrorHandler>,
    metrics: Arc<MetricsCollector>,
}

impl ResilientFetcher {
    /// 创建下载器
    ///
    /// # 参数
    ///
    /// * `policy` - 重试策略
    /// * `errors` - 错误处理器
    /// * `metrics` - 指标收集器
    pub fn new(
        policy: RetryPolicy,
        errors: Arc<ErrorHandler>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, reqwest::Error> {
        let multiplexed = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        let fallback = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .http1_only()
            .build()?;

        Ok(Self {
            multiplexed,
            fallback,
            policy,
            errors,
            metrics,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 单次尝试
    async fn attempt(&self, request: &FetchRequest, attempt: u32) -> Result<Bytes, FetchError> {
        let client = if attempt == 0 {
            &self.multiplexed
        } else {
            &self.fallback
        };
        let user_agent = random_user_agent();
        debug!(url = %request.url, attempt, user_agent, "Fetching image");

        let mut builder = client
            .get(&request.url)
            .timeout(request.timeout)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, IMAGE_ACCEPT);
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }

        let response = builder
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(&request.url, &e))?;

        response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&request.url, &e))
    }
}

#[async_trait]
impl ImageFetcher for ResilientFetcher {
    /// 下载图片，失败时按策略退避重试
    ///
    /// # 参数
    ///
    /// * `request` - 下载请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchedImage)` - 图片字节与重试次数
    /// * `Err(FetchError)` - 所有尝试均失败，指标中记录一次 0 字节的失败下载
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        let attempts = AtomicU32::new(0);
        let result = self
            .errors
            .retry_for(&self.policy, request.chapter, Some(&request.url), || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                self.attempt(request, n)
            })
            .await;

        let retry_count = attempts.load(Ordering::SeqCst).saturating_sub(1);
        match result {
            Ok(bytes) => {
                self.metrics
                    .add_download(request.chapter, bytes.len() as u64, true);
                if retry_count > 0 {
                    counter!("download_retries_total").increment(retry_count as u64);
                    info!(
                        url = %request.url,
                        retry_count,
                        bytes = bytes.len(),
                        "Image downloaded after retries"
                    );
                }
                Ok(FetchedImage {
                    index: request.index,
                    url: request.url.clone(),
                    bytes,
                    retry_count,
                })
            }
            Err(e) => {
                self.metrics.add_download(request.chapter, 0, false);
                warn!(url = %request.url, attempts = retry_count + 1, "Image download failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "fetcher_test.rs"]
mod tests;
