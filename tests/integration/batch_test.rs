// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_app;
use async_trait::async_trait;
use panelrs::domain::models::batch::BatchParams;
use panelrs::domain::models::chapter::{ChapterMap, ChapterNumber, ChapterResult, ChapterStatus};
use panelrs::domain::models::error_context::ErrorCategory;
use panelrs::domain::sites::strategy::{ScrapeStrategy, SiteId};
use panelrs::engines::traits::WebSession;
use panelrs::infrastructure::sites::StrategyRegistry;
use panelrs::infrastructure::storage::InMemoryStorage;
use panelrs::utils::errors::ScrapeError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// 记录并发峰值的抓取策略，总是返回空列表
#[derive(Default)]
struct SlowScrape {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ScrapeStrategy for SlowScrape {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn support_score(&self, _site: &SiteId) -> u8 {
        100
    }

    async fn scrape(
        &self,
        _session: Option<&dyn WebSession>,
        chapter_url: &Url,
        _min_width: u32,
    ) -> Result<Vec<String>, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if chapter_url.path().ends_with("/panic") {
            panic!("strategy blew up");
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn chapters(count: usize) -> ChapterMap {
    (1..=count)
        .map(|n| {
            (
                ChapterNumber::new(n as f64),
                format!("https://example.com/series/chapter-{}", n),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_driverless_concurrency_ceiling() {
    let strategy = Arc::new(SlowScrape::default());
    let registry = StrategyRegistry::new().register_scrape(strategy.clone());
    let app = create_test_app(registry, Arc::new(InMemoryStorage::new()), 2);

    let results = app
        .orchestrator
        .run_batch(&chapters(6), &BatchParams::new("ceiling"), None)
        .await
        .unwrap();

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.status == ChapterStatus::Failed));
    let order: Vec<f64> = results.iter().map(|r| r.chapter.value()).collect();
    assert_eq!(order, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    assert_eq!(strategy.calls.load(Ordering::SeqCst), 6);
    let peak = strategy.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {}", peak);
}

#[tokio::test]
async fn test_callback_errors_do_not_stop_the_batch() {
    let registry = StrategyRegistry::new().register_scrape(Arc::new(SlowScrape::default()));
    let app = create_test_app(registry, Arc::new(InMemoryStorage::new()), 4);

    let calls = AtomicUsize::new(0);
    let mut progress = |_done: usize, _total: usize, _result: &ChapterResult| -> anyhow::Result<()> {
        calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("progress sink unavailable")
    };
    let results = app
        .orchestrator
        .run_batch(&chapters(3), &BatchParams::new("callback"), Some(&mut progress))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_panicking_chapter_is_isolated() {
    let registry = StrategyRegistry::new().register_scrape(Arc::new(SlowScrape::default()));
    let app = create_test_app(registry, Arc::new(InMemoryStorage::new()), 4);

    let mut batch = chapters(2);
    batch.insert(
        ChapterNumber::new(3.0),
        "https://example.com/series/panic".to_string(),
    );
    let results = app
        .orchestrator
        .run_batch(&batch, &BatchParams::new("panic"), None)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let panicked = &results[2];
    assert_eq!(panicked.chapter, ChapterNumber::new(3.0));
    assert_eq!(panicked.status, ChapterStatus::Failed);
    assert!(panicked.error.is_some());
}

#[tokio::test]
async fn test_invalid_params_process_nothing() {
    let strategy = Arc::new(SlowScrape::default());
    let registry = StrategyRegistry::new().register_scrape(strategy.clone());
    let app = create_test_app(registry, Arc::new(InMemoryStorage::new()), 4);

    let params = BatchParams {
        jpeg_quality: 0,
        ..BatchParams::new("bad")
    };
    assert!(app.orchestrator.run_batch(&chapters(2), &params, None).await.is_err());
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.metrics.stats().chapters_total, 0);
    let validation = app.errors.breaker().stats(ErrorCategory::Validation);
    assert_eq!(validation.failure_count, 0);
}
