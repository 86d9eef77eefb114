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

use crate::segmentation::SegmentationConfig;
use crate::utils::errors::ValidationError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::validators;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含批处理引擎、下载、浏览器、输出、切割、清理服务和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 批处理引擎配置
    pub engine: EngineSettings,
    /// 图片下载配置
    pub fetch: FetchSettings,
    /// 浏览器配置
    pub browser: BrowserSettings,
    /// 输出配置
    pub output: OutputSettings,
    /// 分镜切割阈值
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    /// 清理服务配置
    pub cleaner: CleanerSettings,
    /// 指标导出配置
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// 批处理引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// 浏览器会话数量
    pub num_sessions: usize,
    /// 每个章节的并发下载数
    pub workers_per_chapter: usize,
    /// 下载前随机等待下限（毫秒）
    pub throttle_min_ms: u64,
    /// 下载前随机等待上限（毫秒）
    pub throttle_max_ms: u64,
    /// 相邻会话启动间隔（毫秒）
    pub session_start_delay_ms: u64,
    /// 等待下载槽位的最长时间（秒）
    pub slot_wait_secs: u64,
    /// 无需浏览器的章节并发数
    pub driverless_concurrency: usize,
    /// 浏览器故障后重启会话重试的次数
    pub navigation_retries: u32,
}

/// 图片下载配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,
}

/// 浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// 是否无头运行
    pub headless: bool,
    /// 持久化配置目录标识，为空时每个会话使用临时目录
    pub profile_id: Option<String>,
    /// 页面加载超时（秒）
    pub page_load_timeout_secs: u64,
    /// 持久化配置目录的根目录
    pub profiles_dir: String,
}

/// 输出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// 输出根目录
    pub root: String,
    /// JPEG 质量
    pub jpeg_quality: u8,
    /// 最小图片宽度
    pub min_image_width: u32,
}

/// 清理服务配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CleanerSettings {
    /// 是否启用
    pub enabled: bool,
    /// 清理接口地址
    pub api_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 指标导出配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus 监听地址，为空时不启动导出
    pub prometheus_addr: Option<SocketAddr>,
}

impl EngineSettings {
    /// 随机等待区间
    pub fn throttle_range(&self) -> RangeInclusive<u64> {
        let min = self.throttle_min_ms.min(self.throttle_max_ms);
        min..=self.throttle_max_ms.max(min)
    }

    pub fn session_start_delay(&self) -> Duration {
        Duration::from_millis(self.session_start_delay_ms)
    }

    pub fn slot_wait(&self) -> Duration {
        Duration::from_secs(self.slot_wait_secs)
    }
}

impl FetchSettings {
    /// 下载重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fetcher()
            .with_max_attempts(self.max_attempts)
            .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BrowserSettings {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    /// 会话的持久化配置目录，未设置标识时为 `None`
    pub fn profile_dir(&self, index: usize) -> Option<PathBuf> {
        self.profile_id.as_ref().map(|id| {
            PathBuf::from(&self.profiles_dir)
                .join(id)
                .join(format!("session_{}", index))
        })
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            profile_id: None,
            page_load_timeout_secs: 25,
            profiles_dir: "profiles".to_string(),
        }
    }
}

impl CleanerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// 以 `PANELRS` 为前缀、`__` 为分隔符的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PANELRS").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 只包含默认值的构建器
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Engine
            .set_default("engine.num_sessions", 3)?
            .set_default("engine.workers_per_chapter", 4)?
            .set_default("engine.throttle_min_ms", 80)?
            .set_default("engine.throttle_max_ms", 150)?
            .set_default("engine.session_start_delay_ms", 800)?
            .set_default("engine.slot_wait_secs", 10)?
            .set_default("engine.driverless_concurrency", 8)?
            .set_default("engine.navigation_retries", 2)?
            // Fetch
            .set_default("fetch.timeout_secs", 30)?
            .set_default("fetch.max_attempts", 4)?
            .set_default("fetch.backoff_base_ms", 500)?
            // Browser
            .set_default("browser.headless", true)?
            .set_default("browser.page_load_timeout_secs", 25)?
            .set_default("browser.profiles_dir", "profiles")?
            // Output
            .set_default("output.root", "output")?
            .set_default("output.jpeg_quality", 92)?
            .set_default("output.min_image_width", 200)?
            // Cleaner
            .set_default("cleaner.enabled", false)?
            .set_default("cleaner.api_url", "http://localhost:8000/clean")?
            .set_default("cleaner.timeout_secs", 60)
    }

    /// 只使用默认值
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    /// 校验数值范围
    pub fn validate(&self) -> Result<(), ValidationError> {
        validators::validate_range("engine.num_sessions", self.engine.num_sessions as i64, 1, 64)?;
        validators::validate_range(
            "engine.workers_per_chapter",
            self.engine.workers_per_chapter as i64,
            1,
            64,
        )?;
        validators::validate_range(
            "engine.driverless_concurrency",
            self.engine.driverless_concurrency as i64,
            1,
            256,
        )?;
        validators::validate_range("fetch.timeout_secs", self.fetch.timeout_secs as i64, 1, 300)?;
        validators::validate_range("fetch.max_attempts", self.fetch.max_attempts as i64, 1, 20)?;
        validators::validate_range("output.jpeg_quality", self.output.jpeg_quality as i64, 1, 100)?;
        validators::validate_range(
            "output.min_image_width",
            self.output.min_image_width as i64,
            50,
            5000,
        )?;
        if self.engine.throttle_min_ms > self.engine.throttle_max_ms {
            return Err(ValidationError::Invalid(format!(
                "engine.throttle_min_ms ({}) exceeds engine.throttle_max_ms ({})",
                self.engine.throttle_min_ms, self.engine.throttle_max_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
