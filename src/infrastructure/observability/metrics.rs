// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 配置了地址时启动 Prometheus 导出器，并注册各类监控指标的说明
///
/// # 参数
///
/// * `addr` - 导出器监听地址，None 时只注册说明
pub fn init_metrics(addr: Option<SocketAddr>) {
    if let Some(addr) = addr {
        // Ignore error if address is already in use (for development/testing)
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!("Metrics exporter listening on {}", addr),
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    }

    describe_metrics();
}

/// 注册指标说明
pub fn describe_metrics() {
    describe_counter!("chapters_started_total", "Total number of chapters started");
    describe_counter!(
        "chapters_completed_total",
        "Total number of chapters completed, labelled by outcome"
    );
    describe_counter!("images_found_total", "Total number of image URLs discovered");
    describe_counter!(
        "images_processed_total",
        "Total number of images segmented and saved"
    );
    describe_counter!("downloads_total", "Total number of image downloads by outcome");
    describe_counter!("download_bytes_total", "Total bytes downloaded");
    describe_counter!("download_retries_total", "Total number of download retries");
    describe_counter!(
        "download_slot_timeouts_total",
        "Downloads that proceeded without a global download slot"
    );
    describe_counter!(
        "strategy_attempts_total",
        "Scrape strategy attempts, labelled by strategy and outcome"
    );
    describe_counter!("panels_saved_total", "Total number of panel files written");
    describe_counter!("errors_total", "Total number of handled errors by category");
    describe_counter!("session_restarts_total", "Total number of browser session restarts");
    describe_counter!("circuit_breaker_requests_total", "Requests seen by circuit breakers");
    describe_counter!("circuit_breaker_failures_total", "Failures seen by circuit breakers");
    describe_counter!("circuit_breaker_successes_total", "Successes seen by circuit breakers");
    describe_counter!("circuit_breaker_rejected_total", "Executions refused by open circuits");
    describe_gauge!(
        "circuit_breaker_status",
        "Circuit status per category (0 closed, 0.5 half-open, 1 open)"
    );
    describe_gauge!("browser_sessions_active", "Number of live browser sessions");
    describe_gauge!("download_slots_available", "Free global download slots");
}
