// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::ChapterNumber;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

static GLOBAL_COLLECTOR: Lazy<Arc<MetricsCollector>> =
    Lazy::new(|| Arc::new(MetricsCollector::new()));

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// 单章节指标
///
/// 任务开始时创建，由下载和分割阶段增量更新，任务结束时定稿。
/// 派生指标（耗时、速度、成功率）在读取时计算
#[derive(Debug, Clone, Serialize)]
pub struct ChapterMetrics {
    pub chapter: ChapterNumber,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub images_found: usize,
    pub images_downloaded: usize,
    pub images_processed: usize,
    pub download_errors: usize,
    pub total_bytes: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ChapterMetrics {
    pub fn new(chapter: ChapterNumber, url: impl Into<String>) -> Self {
        Self {
            chapter,
            url: url.into(),
            started_at: Utc::now(),
            ended_at: None,
            images_found: 0,
            images_downloaded: 0,
            images_processed: 0,
            download_errors: 0,
            total_bytes: 0,
            success: false,
            error_message: None,
        }
    }

    /// 耗时，未结束时计算到当前时间
    pub fn duration(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    /// 下载速度（MB/s）
    pub fn download_speed_mbps(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / BYTES_PER_MB / secs
    }

    /// 下载成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.images_found == 0 {
            return 0.0;
        }
        self.images_downloaded as f64 / self.images_found as f64 * 100.0
    }
}

/// 会话汇总统计
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub elapsed: String,
    pub chapters_total: usize,
    pub chapters_successful: usize,
    pub chapters_failed: usize,
    pub images_found: usize,
    pub images_downloaded: usize,
    pub images_processed: usize,
    pub download_errors: usize,
    pub total_mb: f64,
    pub average_chapter_secs: f64,
    pub download_speed_mbps: f64,
    pub success_rate: f64,
}

#[derive(Serialize)]
struct MetricsReport<'a> {
    session: &'a SessionStats,
    chapters: Vec<ChapterMetrics>,
}

/// 指标收集器
///
/// 多个章节任务并发更新，内部同步对调用方不可见
pub struct MetricsCollector {
    chapters: DashMap<ChapterNumber, ChapterMetrics>,
    session_start: Mutex<DateTime<Utc>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            chapters: DashMap::new(),
            session_start: Mutex::new(Utc::now()),
        }
    }

    /// 进程级默认实例，可通过 `reset` 清空
    pub fn global() -> Arc<MetricsCollector> {
        GLOBAL_COLLECTOR.clone()
    }

    /// 开始跟踪章节
    pub fn start_chapter(&self, chapter: ChapterNumber, url: &str) {
        self.chapters
            .insert(chapter, ChapterMetrics::new(chapter, url));
        counter!("chapters_started_total").increment(1);
    }

    /// 记录发现的图片数量
    pub fn set_found(&self, chapter: ChapterNumber, found: usize) {
        if let Some(mut m) = self.chapters.get_mut(&chapter) {
            m.images_found = found;
        }
        counter!("images_found_total").increment(found as u64);
    }

    /// 记录一次下载结果
    ///
    /// # 参数
    ///
    /// * `chapter` - 所属章节，None 时只更新全局计数器
    /// * `bytes` - 下载字节数，失败时为 0
    /// * `success` - 是否成功
    pub fn add_download(&self, chapter: Option<ChapterNumber>, bytes: u64, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        counter!("downloads_total", "outcome" => outcome).increment(1);
        counter!("download_bytes_total").increment(bytes);

        let Some(chapter) = chapter else {
            return;
        };
        if let Some(mut m) = self.chapters.get_mut(&chapter) {
            if success {
                m.images_downloaded += 1;
                m.total_bytes += bytes;
            } else {
                m.download_errors += 1;
            }
        }
    }

    /// 记录处理完成的图片
    pub fn add_processed(&self, chapter: ChapterNumber, count: usize) {
        if let Some(mut m) = self.chapters.get_mut(&chapter) {
            m.images_processed += count;
        }
        counter!("images_processed_total").increment(count as u64);
    }

    /// 结束章节跟踪
    pub fn end_chapter(&self, chapter: ChapterNumber, success: bool, error: Option<String>) {
        if let Some(mut m) = self.chapters.get_mut(&chapter) {
            m.ended_at = Some(Utc::now());
            m.success = success;
            m.error_message = error;
        }
        let outcome = if success { "success" } else { "failure" };
        counter!("chapters_completed_total", "outcome" => outcome).increment(1);
    }

    /// 章节指标快照
    pub fn chapter(&self, chapter: &ChapterNumber) -> Option<ChapterMetrics> {
        self.chapters.get(chapter).map(|m| m.clone())
    }

    /// 所有章节指标快照，按章节号排序
    pub fn chapters(&self) -> Vec<ChapterMetrics> {
        let mut all: Vec<ChapterMetrics> = self.chapters.iter().map(|m| m.clone()).collect();
        all.sort_by(|a, b| a.chapter.cmp(&b.chapter));
        all
    }

    /// 会话汇总统计
    pub fn stats(&self) -> SessionStats {
        let started_at = *self.session_start.lock();
        let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
        let chapters = self.chapters();

        let finished: Vec<&ChapterMetrics> =
            chapters.iter().filter(|m| m.ended_at.is_some()).collect();
        let chapters_successful = finished.iter().filter(|m| m.success).count();
        let images_found: usize = chapters.iter().map(|m| m.images_found).sum();
        let images_downloaded: usize = chapters.iter().map(|m| m.images_downloaded).sum();
        let total_bytes: u64 = chapters.iter().map(|m| m.total_bytes).sum();
        let total_mb = total_bytes as f64 / BYTES_PER_MB;

        let average_chapter_secs = if finished.is_empty() {
            0.0
        } else {
            finished.iter().map(|m| m.duration().as_secs_f64()).sum::<f64>()
                / finished.len() as f64
        };
        let elapsed_secs = elapsed.as_secs_f64();

        SessionStats {
            started_at,
            elapsed: format_duration(elapsed),
            chapters_total: chapters.len(),
            chapters_successful,
            chapters_failed: finished.len() - chapters_successful,
            images_found,
            images_downloaded,
            images_processed: chapters.iter().map(|m| m.images_processed).sum(),
            download_errors: chapters.iter().map(|m| m.download_errors).sum(),
            total_mb,
            average_chapter_secs,
            download_speed_mbps: if elapsed_secs > 0.0 {
                total_mb / elapsed_secs
            } else {
                0.0
            },
            success_rate: if images_found > 0 {
                images_downloaded as f64 / images_found as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// 导出JSON报告
    pub async fn export_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let stats = self.stats();
        let report = MetricsReport {
            session: &stats,
            chapters: self.chapters(),
        };
        let json = serde_json::to_vec_pretty(&report)?;
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await
    }

    /// 清空所有章节指标并重新计时
    pub fn reset(&self) {
        self.chapters.clear();
        *self.session_start.lock() = Utc::now();
    }
}

/// 格式化时长，如 `1h 2m 3s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
