// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{checker_png, create_test_app, create_test_app_with_slots};
use panelrs::domain::models::batch::BatchParams;
use panelrs::domain::models::chapter::{ChapterMap, ChapterNumber, ChapterResult, ChapterStatus};
use panelrs::engines::download::DownloadSlots;
use panelrs::infrastructure::sites::{GenericStrategy, MangaDexStrategy, StrategyRegistry};
use panelrs::infrastructure::storage::{InMemoryStorage, LocalStorage};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TITLE: &str = "a1c7c817-4e59-43b7-9365-09675a149a6f";
const CHAPTER_ONE: &str = "11111111-1111-4111-8111-111111111111";
const CHAPTER_TWO: &str = "22222222-2222-4222-8222-222222222222";

fn registry(api: &str) -> StrategyRegistry {
    let mangadex = Arc::new(MangaDexStrategy::with_api_base(api));
    StrategyRegistry::new()
        .register_discovery(mangadex.clone())
        .register_scrape(mangadex)
        .with_discovery_fallback(Arc::new(GenericStrategy::new()))
        .with_scrape_fallback(Arc::new(GenericStrategy::new()))
}

async fn mount_series(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/manga/{}/feed", TITLE)))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "total": 2,
            "data": [
                {"id": CHAPTER_TWO, "attributes": {"chapter": "2"}},
                {"id": CHAPTER_ONE, "attributes": {"chapter": "1"}}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/at-home/server/{}", CHAPTER_ONE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "baseUrl": server.uri(),
            "chapter": {"hash": "h1", "data": ["a.png", "b.png"]}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/at-home/server/{}", CHAPTER_TWO)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "baseUrl": server.uri(),
            "chapter": {"hash": "h2", "data": []}
        })))
        .mount(server)
        .await;

    for file in ["a.png", "b.png"] {
        Mock::given(method("GET"))
            .and(path(format!("/data/h1/{}", file)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(checker_png(400, 600).to_vec()),
            )
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_discover_and_process_series() {
    let server = MockServer::start().await;
    mount_series(&server).await;
    let output = TempDir::new().unwrap();
    let app = create_test_app(
        registry(&server.uri()),
        Arc::new(LocalStorage::new(output.path())),
        4,
    );

    let series = format!("https://mangadex.org/title/{}/solo-leveling", TITLE);
    let chapters = app.orchestrator.discover_series(&series).await.unwrap();
    assert_eq!(
        chapters.keys().copied().collect::<Vec<_>>(),
        vec![ChapterNumber::new(1.0), ChapterNumber::new(2.0)]
    );

    let mut seen = Vec::new();
    let mut progress = |done: usize, total: usize, result: &ChapterResult| -> anyhow::Result<()> {
        seen.push((done, total, result.chapter));
        Ok(())
    };
    let results = app
        .orchestrator
        .run_batch(
            &chapters,
            &BatchParams::new("Solo Leveling"),
            Some(&mut progress),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let first = &results[0];
    assert_eq!(first.chapter, ChapterNumber::new(1.0));
    assert_eq!(first.status, ChapterStatus::Succeeded);
    assert_eq!(first.found_count, 2);
    assert_eq!(first.downloaded_count, 2);
    assert_eq!(first.panels_saved, 2);
    assert_eq!(first.strategy.as_deref(), Some("mangadex"));
    assert!(output.path().join("Solo_Leveling/1/panel_001.jpg").is_file());
    assert!(output.path().join("Solo_Leveling/1/panel_002.jpg").is_file());

    let second = &results[1];
    assert_eq!(second.status, ChapterStatus::Failed);
    assert_eq!(second.panels_saved, 0);
    assert!(second.error.is_some());
    assert!(!output.path().join("Solo_Leveling/2").exists());

    assert_eq!(seen.len(), 2);
    assert_eq!(seen.iter().map(|(done, _, _)| *done).collect::<Vec<_>>(), vec![1, 2]);
    assert!(seen.iter().all(|(_, total, _)| *total == 2));

    let stats = app.metrics.stats();
    assert_eq!(stats.chapters_total, 2);
    assert_eq!(stats.chapters_successful, 1);
    assert_eq!(stats.chapters_failed, 1);
    assert_eq!(stats.images_processed, 2);

    // driverless sites never touch the browser
    assert_eq!(app.factory.attempts.load(Ordering::SeqCst), 0);
    app.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_unknown_series_has_no_chapters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let output = TempDir::new().unwrap();
    let app = create_test_app(
        registry(&server.uri()),
        Arc::new(LocalStorage::new(output.path())),
        4,
    );

    let series = format!("https://mangadex.org/title/{}", TITLE);
    assert!(app.orchestrator.discover_series(&series).await.is_err());
    assert!(app.orchestrator.discover_series("ftp://mangadex.org/x").await.is_err());
}

#[tokio::test]
async fn test_download_slots_cap_the_whole_batch() {
    let server = MockServer::start().await;
    let mut chapters = ChapterMap::new();
    for n in 1..=4u32 {
        let id = format!("{n}{n}{n}{n}{n}{n}{n}{n}-0000-4000-8000-000000000000");
        Mock::given(method("GET"))
            .and(path(format!("/at-home/server/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "ok",
                "baseUrl": server.uri(),
                "chapter": {"hash": format!("h{n}"), "data": ["a.png", "b.png", "c.png"]}
            })))
            .mount(&server)
            .await;
        chapters.insert(
            ChapterNumber::new(n as f64),
            format!("https://mangadex.org/chapter/{}", id),
        );
    }
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/data/h\d/[abc]\.png$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(checker_png(200, 300).to_vec())
                .set_delay(Duration::from_millis(80)),
        )
        .mount(&server)
        .await;

    let slots = DownloadSlots::new(3, Duration::from_secs(30));
    let app = create_test_app_with_slots(
        registry(&server.uri()),
        Arc::new(InMemoryStorage::new()),
        4,
        Some(slots.clone()),
    );

    let results = app
        .orchestrator
        .run_batch(&chapters, &BatchParams::new("Slots"), None)
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    for result in &results {
        assert_eq!(result.status, ChapterStatus::Succeeded, "{:?}", result.error);
        assert_eq!(result.downloaded_count, 3);
        assert!(!result.degraded);
    }
    // 4 个章节各自 4 路并发，全局槽位仍把进行中的下载限制在 3 个以内
    assert_eq!(app.downloads.completed.load(Ordering::SeqCst), 12);
    let peak = app.downloads.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight downloads {peak}");
    assert!(peak >= 2);
    assert_eq!(slots.available(), 3);
}
