// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use panelrs::engines::download::DownloadSlots;
use panelrs::engines::error_handler::ErrorHandler;
use panelrs::engines::fetcher::ResilientFetcher;
use panelrs::engines::traits::{FetchRequest, FetchedImage, ImageFetcher, SessionFactory, WebSession};
use panelrs::infrastructure::observability::collector::MetricsCollector;
use panelrs::infrastructure::sites::StrategyRegistry;
use panelrs::utils::errors::{FetchError, SessionError};
use panelrs::utils::retry_policy::RetryPolicy;
use panelrs::domain::repositories::storage_repository::StorageRepository;
use panelrs::workers::{BatchOrchestrator, ChapterWorker, OrchestratorConfig, WorkerOptions};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 永远无法启动浏览器的工厂
#[derive(Default)]
pub struct NoBrowser {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl SessionFactory for NoBrowser {
    async fn create(&self, _index: usize) -> Result<Box<dyn WebSession>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SessionError::Launch("no browser in tests".to_string()))
    }
}

/// 棋盘格内容的 PNG
pub fn checker_png(width: u32, height: u32) -> Bytes {
    let gray = GrayImage::from_fn(width, height, |x, y| {
        Luma([if (x / 8 + y / 8) % 2 == 0 { 20 } else { 220 }])
    });
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(gray)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    Bytes::from(png)
}

/// 统计同时进行中的下载数
pub struct InFlightFetcher {
    inner: ResilientFetcher,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub completed: AtomicUsize,
}

#[async_trait]
impl ImageFetcher for InFlightFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.fetch(request).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

pub struct TestApp {
    pub orchestrator: BatchOrchestrator,
    pub metrics: Arc<MetricsCollector>,
    pub errors: Arc<ErrorHandler>,
    pub factory: Arc<NoBrowser>,
    pub downloads: Arc<InFlightFetcher>,
}

/// 使用真实下载器和给定注册表组装编排器
pub fn create_test_app(
    registry: StrategyRegistry,
    storage: Arc<dyn StorageRepository>,
    driverless_concurrency: usize,
) -> TestApp {
    create_test_app_with_slots(registry, storage, driverless_concurrency, None)
}

/// 同上，所有章节共享给定的下载槽位
pub fn create_test_app_with_slots(
    registry: StrategyRegistry,
    storage: Arc<dyn StorageRepository>,
    driverless_concurrency: usize,
    slots: Option<DownloadSlots>,
) -> TestApp {
    let errors = Arc::new(ErrorHandler::new());
    let metrics = Arc::new(MetricsCollector::new());
    let policy = RetryPolicy::fetcher()
        .with_max_attempts(2)
        .with_backoff_base(Duration::from_millis(1));
    let downloads = Arc::new(InFlightFetcher {
        inner: ResilientFetcher::new(policy, errors.clone(), metrics.clone()).unwrap(),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
    });

    let mut worker = ChapterWorker::new(
        Arc::new(registry),
        downloads.clone(),
        storage,
        errors.clone(),
        metrics.clone(),
    )
    .with_options(WorkerOptions {
        throttle_ms: 0..=0,
        ..WorkerOptions::default()
    });
    if let Some(slots) = slots {
        worker = worker.with_slots(slots);
    }

    let factory = Arc::new(NoBrowser::default());
    let orchestrator = BatchOrchestrator::new(
        Arc::new(worker),
        factory.clone(),
        OrchestratorConfig {
            num_sessions: 2,
            session_start_delay: Duration::ZERO,
            driverless_concurrency,
        },
    );

    TestApp {
        orchestrator,
        metrics,
        errors,
        factory,
        downloads,
    }
}
