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

use crate::config::settings::Settings;
use crate::domain::models::batch::BatchParams;
use crate::domain::models::chapter::{ChapterResult, ChapterStatus, ChapterTask};
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::engines::download::{DownloadBatch, DownloadSlots};
use crate::engines::error_handler::ErrorHandler;
use crate::engines::session_pool::SessionPool;
use crate::engines::traits::{FetchRequest, ImageFetcher};
use crate::infrastructure::cleaner::CleanerClient;
use crate::infrastructure::observability::collector::MetricsCollector;
use crate::infrastructure::sites::{ScrapeOutcome, StrategyRegistry};
use crate::infrastructure::storage::panel_key;
use crate::segmentation::PanelSegmenter;
use crate::utils::errors::{ChapterError, ScrapeError, SegmentationError};
use crate::utils::validators;
use metrics::counter;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// 章节处理选项
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// 每个章节的并发下载数
    pub workers_per_chapter: usize,
    /// 下载前随机等待区间（毫秒）
    pub throttle_ms: RangeInclusive<u64>,
    /// 页面加载超时
    pub page_load_timeout: Duration,
    /// 浏览器故障后重启会话重试的次数
    pub navigation_retries: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers_per_chapter: 4,
            throttle_ms: 80..=150,
            page_load_timeout: Duration::from_secs(25),
            navigation_retries: 2,
        }
    }
}

impl WorkerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            workers_per_chapter: settings.engine.workers_per_chapter,
            throttle_ms: settings.engine.throttle_range(),
            page_load_timeout: settings.browser.page_load_timeout(),
            navigation_retries: settings.engine.navigation_retries,
        }
    }
}

/// 章节任务持有的会话租约
///
/// 任务独占池中一个索引的会话，浏览器故障时可以原地重启
#[derive(Clone, Copy)]
pub struct SessionLease<'a> {
    pub pool: &'a SessionPool,
    pub index: usize,
}

/// 章节处理器
///
/// 执行单个章节的完整流水线：验证、抓取图片地址、下载、切割、清理、保存。
/// 任何失败都转换为章节结果，不会向上传播
pub struct ChapterWorker {
    registry: Arc<StrategyRegistry>,
    fetcher: Arc<dyn ImageFetcher>,
    slots: Option<DownloadSlots>,
    segmenter: PanelSegmenter,
    storage: Arc<dyn StorageRepository>,
    cleaner: Option<CleanerClient>,
    errors: Arc<ErrorHandler>,
    metrics: Arc<MetricsCollector>,
    options: WorkerOptions,
}

impl ChapterWorker {
    /// 创建章节处理器
    ///
    /// # 参数
    ///
    /// * `registry` - 站点策略注册表
    /// * `fetcher` - 图片下载器
    /// * `storage` - 分镜存储
    /// * `errors` - 错误处理器
    /// * `metrics` - 指标收集器
    pub fn new(
        registry: Arc<StrategyRegistry>,
        fetcher: Arc<dyn ImageFetcher>,
        storage: Arc<dyn StorageRepository>,
        errors: Arc<ErrorHandler>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            slots: None,
            segmenter: PanelSegmenter::default(),
            storage,
            cleaner: None,
            errors,
            metrics,
            options: WorkerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// 所有章节共享的全局下载槽位
    pub fn with_slots(mut self, slots: DownloadSlots) -> Self {
        self.slots = Some(slots);
        self
    }

    pub fn with_segmenter(mut self, segmenter: PanelSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_cleaner(mut self, cleaner: Option<CleanerClient>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// 处理单个章节
    ///
    /// # 参数
    ///
    /// * `task` - 章节任务
    /// * `params` - 批处理参数
    /// * `lease` - 浏览器会话租约，无需浏览器的章节为 None
    ///
    /// # 返回值
    ///
    /// 章节结果，失败时带有面向用户的错误描述
    #[instrument(skip_all, fields(chapter = %task.chapter, url = %task.source_url))]
    pub async fn process(
        &self,
        mut task: ChapterTask,
        params: &BatchParams,
        lease: Option<SessionLease<'_>>,
    ) -> ChapterResult {
        let started = Instant::now();
        task.status = ChapterStatus::Running;
        let mut result = ChapterResult::pending(task.chapter, &task.source_url);
        result.status = task.status;

        self.metrics.start_chapter(task.chapter, &task.source_url);

        let outcome = self.run(&task, params, lease, &mut result).await;
        result.duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                result.status = ChapterStatus::Succeeded;
                self.metrics.end_chapter(task.chapter, true, None);
                info!(
                    found = result.found_count,
                    downloaded = result.downloaded_count,
                    panels = result.panels_saved,
                    duration_ms = result.duration_ms,
                    "Chapter completed"
                );
            }
            Err(e) => self.fail(&mut result, &e),
        }
        result
    }

    /// 把错误记录为章节失败
    pub fn fail(&self, result: &mut ChapterResult, err: &ChapterError) {
        let ctx = self
            .errors
            .classify(err, Some(result.chapter), Some(result.url.as_str()));
        self.errors.handle(&ctx);

        let message = ctx.describe();
        result.status = ChapterStatus::Failed;
        result.error = Some(message.clone());
        self.metrics.end_chapter(result.chapter, false, Some(message));
    }

    async fn run(
        &self,
        task: &ChapterTask,
        params: &BatchParams,
        lease: Option<SessionLease<'_>>,
        result: &mut ChapterResult,
    ) -> Result<(), ChapterError> {
        let chapter = validators::validate_chapter_number(task.chapter)?;
        let url = validators::validate_url(&task.source_url)?;

        let outcome = match lease {
            Some(lease) => self.scrape_with_session(lease, &url, params.min_image_width).await?,
            None => {
                self.registry
                    .run_scrape_chain(None, &url, params.min_image_width)
                    .await?
            }
        };

        result.found_count = outcome.urls.len();
        result.strategy = outcome.strategy.map(str::to_string);
        self.metrics.set_found(chapter, outcome.urls.len());
        if outcome.urls.is_empty() {
            return Err(ChapterError::NoImages(url.to_string()));
        }

        let pause = rand::random_range(self.options.throttle_ms.clone());
        tokio::time::sleep(Duration::from_millis(pause)).await;

        let timeout = Duration::from_secs(params.request_timeout_secs);
        let requests: Vec<FetchRequest> = outcome
            .urls
            .iter()
            .enumerate()
            .map(|(index, image)| {
                FetchRequest::new(index, image.clone(), timeout)
                    .with_referer(url.as_str())
                    .with_chapter(chapter)
            })
            .collect();

        let mut batch = DownloadBatch::new(self.fetcher.clone(), self.options.workers_per_chapter);
        if let Some(slots) = &self.slots {
            batch = batch.with_slots(slots.clone());
        }

        let mut images = batch.spawn_stream(requests);
        let mut last_segmentation_error: Option<SegmentationError> = None;
        while let Some(fetched) = images.recv().await {
            let image = match fetched {
                Ok(image) => image,
                Err(e) => {
                    debug!("Image dropped after retries: {}", e);
                    continue;
                }
            };
            result.downloaded_count += 1;

            let panels = match self
                .segmenter
                .segment_to_jpeg(image.bytes, params.jpeg_quality)
                .await
            {
                Ok(panels) => panels,
                Err(e) => {
                    let ctx = self.errors.classify(&e, Some(chapter), Some(image.url.as_str()));
                    self.errors.handle(&ctx);
                    last_segmentation_error = Some(e);
                    continue;
                }
            };

            let count = panels.len();
            for jpeg in panels {
                let jpeg = match &self.cleaner {
                    Some(cleaner) => cleaner.clean(jpeg).await,
                    None => jpeg,
                };
                // 序号在保存时分配，与下载完成顺序一致
                let key = panel_key(&params.series_name, chapter, result.panels_saved + 1);
                self.storage.save(&key, &jpeg).await?;
                result.panels_saved += 1;
            }

            self.metrics.add_processed(chapter, 1);
            counter!("panels_saved_total").increment(count as u64);
            debug!(index = image.index, panels = count, "Image processed");
        }

        result.degraded = batch.degraded_count() > 0;

        if result.downloaded_count == 0 {
            return Err(ChapterError::NothingDownloaded(result.found_count));
        }
        if result.downloaded_count < result.found_count {
            warn!(
                found = result.found_count,
                downloaded = result.downloaded_count,
                "Some images could not be downloaded"
            );
        }
        if result.panels_saved == 0 {
            if let Some(e) = last_segmentation_error {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// 使用浏览器会话抓取图片地址
    ///
    /// 浏览器层面的失败会重启会话并重试，最多重试 `navigation_retries` 次
    async fn scrape_with_session(
        &self,
        lease: SessionLease<'_>,
        url: &Url,
        min_width: u32,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let mut attempt = 0;
        loop {
            let session = lease.pool.acquire(lease.index)?;
            let outcome = match session
                .navigate(url.as_str(), self.options.page_load_timeout)
                .await
            {
                Ok(()) => {
                    self.registry
                        .run_scrape_chain(Some(session.as_ref()), url, min_width)
                        .await
                }
                Err(e) => Err(ScrapeError::from(e)),
            };

            match outcome {
                Err(e) if e.is_driver_failure() && attempt < self.options.navigation_retries => {
                    attempt += 1;
                    warn!(
                        session = lease.index,
                        attempt,
                        max_retries = self.options.navigation_retries,
                        "Browser failure, restarting session: {}",
                        e
                    );
                    lease.pool.restart(lease.index).await?;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
#[path = "chapter_worker_test.rs"]
mod tests;
