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

use anyhow::Context;
use clap::Parser;
use panelrs::config::settings::Settings;
use panelrs::domain::models::batch::BatchParams;
use panelrs::domain::models::chapter::{ChapterMap, ChapterNumber, ChapterResult};
use panelrs::domain::models::error_context::ErrorCategory;
use panelrs::engines::browser_session::ChromiumSessionFactory;
use panelrs::engines::circuit_breaker::Status;
use panelrs::engines::download::DownloadSlots;
use panelrs::engines::error_handler::ErrorHandler;
use panelrs::engines::fetcher::ResilientFetcher;
use panelrs::infrastructure::cleaner::CleanerClient;
use panelrs::infrastructure::observability::collector::{format_duration, MetricsCollector};
use panelrs::infrastructure::observability::metrics;
use panelrs::infrastructure::sites::default_registry;
use panelrs::infrastructure::storage::LocalStorage;
use panelrs::segmentation::PanelSegmenter;
use panelrs::utils::telemetry;
use panelrs::workers::{BatchOrchestrator, ChapterWorker, OrchestratorConfig, WorkerOptions};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// panelrs - 把长条漫画章节下载并切割为分镜
#[derive(Parser, Debug)]
#[command(name = "panelrs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 作品主页URL
    series_url: String,

    /// 作品名称，用作输出目录
    #[arg(short, long)]
    name: Option<String>,

    /// 章节范围，例如 `1-20` 或 `12.5`
    #[arg(short, long)]
    chapters: Option<String>,

    /// 浏览器会话数量，覆盖配置
    #[arg(short, long)]
    sessions: Option<usize>,

    /// 每行输出一条 JSON 日志
    #[arg(long)]
    json_logs: bool,

    /// 把指标报告写入该文件
    #[arg(long)]
    report: Option<PathBuf>,
}

/// 解析章节范围
fn parse_range(raw: &str) -> anyhow::Result<RangeInclusive<ChapterNumber>> {
    let (start, end) = raw.split_once('-').unwrap_or((raw, raw));
    let start: ChapterNumber = start
        .parse()
        .with_context(|| format!("invalid chapter range start: {}", raw))?;
    let end: ChapterNumber = end
        .parse()
        .with_context(|| format!("invalid chapter range end: {}", raw))?;
    anyhow::ensure!(start <= end, "chapter range is reversed: {}", raw);
    Ok(start..=end)
}

/// 作品URL最后一个路径段作为默认名称
fn default_series_name(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .unwrap_or("untitled")
        .to_string()
}

/// 主函数
///
/// 加载配置、发现章节并以批处理方式下载和切割
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Initialize logging
    if cli.json_logs {
        telemetry::init_telemetry_json();
    } else {
        telemetry::init_telemetry();
    }
    info!("Starting panelrs...");

    // 2. Load configuration
    let mut settings = Settings::new()?;
    if let Some(sessions) = cli.sessions {
        settings.engine.num_sessions = sessions;
    }
    settings.validate()?;
    info!("Configuration loaded");

    metrics::init_metrics(settings.metrics.prometheus_addr);

    // 3. Assemble the pipeline
    let errors = ErrorHandler::global();
    let collector = MetricsCollector::global();
    let fetcher = ResilientFetcher::new(
        settings.fetch.retry_policy(),
        errors.clone(),
        collector.clone(),
    )?;
    let slots = DownloadSlots::for_pool(
        settings.engine.num_sessions,
        settings.engine.workers_per_chapter,
        settings.engine.slot_wait(),
    );
    let cleaner = CleanerClient::from_settings(&settings.cleaner)?;
    if let Some(cleaner) = &cleaner {
        match cleaner.health().await {
            Some(health) => info!(status = %health.status, device = %health.device, "Cleaning service reachable"),
            None => warn!(url = %cleaner.health_url(), "Cleaning service unreachable, panels will be kept as is"),
        }
    }

    let worker = ChapterWorker::new(
        Arc::new(default_registry()),
        Arc::new(fetcher),
        Arc::new(LocalStorage::new(&settings.output.root)),
        errors.clone(),
        collector.clone(),
    )
    .with_options(WorkerOptions::from_settings(&settings))
    .with_slots(slots)
    .with_segmenter(PanelSegmenter::new(settings.segmentation.clone()))
    .with_cleaner(cleaner);

    let orchestrator = BatchOrchestrator::new(
        Arc::new(worker),
        Arc::new(ChromiumSessionFactory::new(settings.browser.clone())),
        OrchestratorConfig::from_settings(&settings),
    );

    // 4. Discover and run
    let outcome = run(&cli, &settings, &orchestrator).await;
    orchestrator.shutdown().await;

    let stats = collector.stats();
    info!(
        chapters = stats.chapters_total,
        successful = stats.chapters_successful,
        failed = stats.chapters_failed,
        panels = stats.images_processed,
        total_mb = stats.total_mb,
        elapsed = %stats.elapsed,
        "Batch finished"
    );
    for category in ErrorCategory::ALL {
        let circuit = errors.breaker().stats(category);
        if circuit.status == Status::Open {
            warn!(
                category = category.as_str(),
                failures = circuit.failure_count,
                "Circuit breaker left open"
            );
        }
    }

    if let Some(path) = &cli.report {
        collector
            .export_json(path)
            .await
            .with_context(|| format!("failed to write metrics report to {}", path.display()))?;
        info!("Metrics report written to {}", path.display());
    }

    outcome
}

async fn run(cli: &Cli, settings: &Settings, orchestrator: &BatchOrchestrator) -> anyhow::Result<()> {
    let mut chapters: ChapterMap = orchestrator.discover_series(&cli.series_url).await?;
    if let Some(raw) = &cli.chapters {
        let range = parse_range(raw)?;
        chapters.retain(|chapter, _| range.contains(chapter));
    }
    if chapters.is_empty() {
        warn!("No chapters selected");
        return Ok(());
    }

    let params = BatchParams {
        series_name: cli
            .name
            .clone()
            .unwrap_or_else(|| default_series_name(&cli.series_url)),
        jpeg_quality: settings.output.jpeg_quality,
        min_image_width: settings.output.min_image_width,
        request_timeout_secs: settings.fetch.timeout_secs,
    };
    info!(chapters = chapters.len(), series = %params.series_name, "Starting batch");

    let mut progress = |done: usize, total: usize, result: &ChapterResult| -> anyhow::Result<()> {
        info!(
            "[{}/{}] chapter {} {}: {} panels in {}",
            done,
            total,
            result.chapter,
            result.status,
            result.panels_saved,
            format_duration(std::time::Duration::from_millis(result.duration_ms))
        );
        Ok(())
    };
    let results = orchestrator
        .run_batch(&chapters, &params, Some(&mut progress))
        .await?;

    for failed in results.iter().filter(|r| !r.is_success()) {
        warn!(
            chapter = %failed.chapter,
            "Chapter failed: {}",
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let range = parse_range("3-10").unwrap();
        assert!(range.contains(&ChapterNumber::new(3.0)));
        assert!(range.contains(&ChapterNumber::new(7.5)));
        assert!(!range.contains(&ChapterNumber::new(11.0)));

        let single = parse_range("12.5").unwrap();
        assert!(single.contains(&ChapterNumber::new(12.5)));
        assert!(!single.contains(&ChapterNumber::new(12.0)));

        assert!(parse_range("10-3").is_err());
        assert!(parse_range("a-b").is_err());
    }

    #[test]
    fn test_default_series_name() {
        assert_eq!(default_series_name("https://site.io/manga/solo-leveling/"), "solo-leveling");
        assert_eq!(default_series_name("https://site.io"), "site.io");
    }
}
