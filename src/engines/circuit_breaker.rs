// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::error_context::ErrorCategory;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 熔断器配置
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitConfig {
    /// 失败阈值
    pub failure_threshold: u32,
    /// 恢复超时时间
    pub recovery_timeout: Duration,
}

impl CircuitConfig {
    /// 各错误类别的默认配置
    ///
    /// 网络 3 次 / 30 秒，浏览器 2 次 / 60 秒，其余 5 次 / 60 秒
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Network => Self {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(30),
            },
            ErrorCategory::Driver => Self {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(60),
            },
            _ => Self::default(),
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// 熔断器状态
#[derive(Clone, Debug, Default)]
struct CircuitState {
    /// 当前状态
    status: Status,
    /// 连续失败次数
    failure_count: u32,
    /// 上次失败时间
    last_failure: Option<Instant>,
    /// 半开状态下是否有试探执行尚未记录结果
    trial_in_flight: bool,
    // Statistics
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
}

/// 熔断器状态枚举
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Status {
    /// 关闭状态
    #[default]
    Closed,
    /// 打开状态
    Open,
    /// 半开状态
    HalfOpen,
}

/// 熔断器统计信息
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CircuitStats {
    /// 当前状态
    pub status: Status,
    /// 连续失败次数
    pub failure_count: u32,
    /// 总请求数
    pub total_requests: u64,
    /// 总失败数
    pub total_failures: u64,
    /// 总成功数
    pub total_successes: u64,
}

/// 熔断器
///
/// 每个错误类别一个熔断状态机：
/// closed -(失败达到阈值)-> open -(超时后放行一次)-> half_open -(成功)-> closed / -(失败)-> open
#[derive(Clone)]
pub struct CircuitBreaker {
    /// 状态映射
    states: Arc<Mutex<HashMap<ErrorCategory, CircuitState>>>,
    /// 配置映射
    configs: Arc<RwLock<HashMap<ErrorCategory, CircuitConfig>>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// 创建使用各类别默认配置的熔断器
    pub fn new() -> Self {
        let configs = ErrorCategory::ALL
            .iter()
            .map(|c| (*c, CircuitConfig::for_category(*c)))
            .collect();
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            configs: Arc::new(RwLock::new(configs)),
        }
    }

    /// 设置类别配置
    ///
    /// # 参数
    ///
    /// * `category` - 错误类别
    /// * `config` - 配置
    pub fn set_config(&self, category: ErrorCategory, config: CircuitConfig) {
        self.configs.write().insert(category, config);
    }

    /// 获取类别配置
    pub fn config(&self, category: ErrorCategory) -> CircuitConfig {
        self.configs
            .read()
            .get(&category)
            .cloned()
            .unwrap_or_else(|| CircuitConfig::for_category(category))
    }

    /// 检查是否允许执行
    ///
    /// 打开状态在恢复超时到期后转为半开，并只放行一次试探执行
    ///
    /// # 参数
    ///
    /// * `category` - 错误类别
    ///
    /// # 返回值
    ///
    /// 允许执行返回true
    pub fn can_execute(&self, category: ErrorCategory) -> bool {
        let config = self.config(category);
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        let now = Instant::now();

        match state.status {
            Status::Closed => true,
            Status::Open => {
                let elapsed = state
                    .last_failure
                    .map(|t| now.duration_since(t))
                    .unwrap_or(config.recovery_timeout);
                if elapsed >= config.recovery_timeout {
                    state.status = Status::HalfOpen;
                    state.trial_in_flight = true;
                    self.update_status_metric(category, Status::HalfOpen);
                    return true;
                }
                counter!("circuit_breaker_rejected_total", "category" => category.as_str())
                    .increment(1);
                false
            }
            Status::HalfOpen => {
                // 同一时刻只放行一次试探，结果记录后才会放行下一次
                if !state.trial_in_flight {
                    state.trial_in_flight = true;
                    return true;
                }
                counter!("circuit_breaker_rejected_total", "category" => category.as_str())
                    .increment(1);
                false
            }
        }
    }

    /// 记录成功
    pub fn record_success(&self, category: ErrorCategory) {
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();
        state.total_requests += 1;
        state.total_successes += 1;

        counter!("circuit_breaker_requests_total", "category" => category.as_str()).increment(1);
        counter!("circuit_breaker_successes_total", "category" => category.as_str())
            .increment(1);

        match state.status {
            Status::HalfOpen => {
                state.status = Status::Closed;
                state.failure_count = 0;
                state.trial_in_flight = false;
                self.update_status_metric(category, Status::Closed);
            }
            Status::Closed => state.failure_count = 0,
            Status::Open => {}
        }
    }

    /// 记录失败
    pub fn record_failure(&self, category: ErrorCategory) {
        let config = self.config(category);
        let mut states = self.states.lock();
        let state = states.entry(category).or_default();

        state.total_requests += 1;
        state.total_failures += 1;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        counter!("circuit_breaker_requests_total", "category" => category.as_str()).increment(1);
        counter!("circuit_breaker_failures_total", "category" => category.as_str()).increment(1);

        match state.status {
            Status::Closed => {
                if state.failure_count >= config.failure_threshold {
                    state.status = Status::Open;
                    tracing::warn!(
                        category = %category,
                        failures = state.failure_count,
                        "Circuit breaker opened"
                    );
                    self.update_status_metric(category, Status::Open);
                }
            }
            Status::HalfOpen => {
                state.status = Status::Open;
                state.trial_in_flight = false;
                self.update_status_metric(category, Status::Open);
            }
            Status::Open => {}
        }
    }

    /// 当前状态
    pub fn status(&self, category: ErrorCategory) -> Status {
        self.states
            .lock()
            .get(&category)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    /// 获取类别的熔断统计信息
    pub fn stats(&self, category: ErrorCategory) -> CircuitStats {
        let states = self.states.lock();
        states
            .get(&category)
            .map(|state| CircuitStats {
                status: state.status,
                failure_count: state.failure_count,
                total_requests: state.total_requests,
                total_failures: state.total_failures,
                total_successes: state.total_successes,
            })
            .unwrap_or_default()
    }

    /// 手动重置指定类别
    pub fn reset(&self, category: ErrorCategory) {
        self.states.lock().remove(&category);
        self.update_status_metric(category, Status::Closed);
    }

    /// 手动重置所有类别
    pub fn reset_all(&self) {
        self.states.lock().clear();
        for category in ErrorCategory::ALL {
            self.update_status_metric(category, Status::Closed);
        }
    }

    /// 更新状态指标
    fn update_status_metric(&self, category: ErrorCategory, status: Status) {
        let val = match status {
            Status::Closed => 0.0,
            Status::Open => 1.0,
            Status::HalfOpen => 0.5,
        };
        gauge!("circuit_breaker_status", "category" => category.as_str()).set(val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_network_circuit_opens_after_threshold() {
        let breaker = CircuitBreaker::new();
        let category = ErrorCategory::Network;

        breaker.record_failure(category);
        breaker.record_failure(category);
        assert!(breaker.can_execute(category));

        breaker.record_failure(category);
        assert_eq!(breaker.status(category), Status::Open);
        assert!(!breaker.can_execute(category));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_trial_then_closes() {
        let breaker = CircuitBreaker::new();
        let category = ErrorCategory::Driver;

        breaker.record_failure(category);
        breaker.record_failure(category);
        assert!(!breaker.can_execute(category));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!breaker.can_execute(category));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.can_execute(category));
        assert_eq!(breaker.status(category), Status::HalfOpen);
        assert!(!breaker.can_execute(category));

        breaker.record_success(category);
        assert_eq!(breaker.status(category), Status::Closed);
        assert_eq!(breaker.stats(category).failure_count, 0);
        assert!(breaker.can_execute(category));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfinished_trial_blocks_further_trials() {
        let breaker = CircuitBreaker::new();
        let category = ErrorCategory::Network;
        for _ in 0..3 {
            breaker.record_failure(category);
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.can_execute(category));

        // 试探仍在进行，超过恢复时间也不再放行
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(!breaker.can_execute(category));
        assert_eq!(breaker.status(category), Status::HalfOpen);

        breaker.record_failure(category);
        assert_eq!(breaker.status(category), Status::Open);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.can_execute(category));
        assert!(!breaker.can_execute(category));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new();
        let category = ErrorCategory::Processing;
        for _ in 0..5 {
            breaker.record_failure(category);
        }
        assert!(!breaker.can_execute(category));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.can_execute(category));

        breaker.record_failure(category);
        assert_eq!(breaker.status(category), Status::Open);
        assert!(!breaker.can_execute(category));

        // 重新计时
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!breaker.can_execute(category));
    }

    #[tokio::test(start_paused = true)]
    async fn test_categories_are_independent_and_resettable() {
        let breaker = CircuitBreaker::new();
        breaker.set_config(
            ErrorCategory::Scraping,
            CircuitConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(5),
            },
        );

        breaker.record_failure(ErrorCategory::Scraping);
        assert!(!breaker.can_execute(ErrorCategory::Scraping));
        assert!(breaker.can_execute(ErrorCategory::Network));

        breaker.reset(ErrorCategory::Scraping);
        assert!(breaker.can_execute(ErrorCategory::Scraping));
        assert_eq!(breaker.stats(ErrorCategory::Scraping), CircuitStats::default());
    }

    #[test]
    fn test_default_configs() {
        let network = CircuitConfig::for_category(ErrorCategory::Network);
        assert_eq!(network.failure_threshold, 3);
        assert_eq!(network.recovery_timeout, Duration::from_secs(30));

        let driver = CircuitConfig::for_category(ErrorCategory::Driver);
        assert_eq!(driver.failure_threshold, 2);
        assert_eq!(driver.recovery_timeout, Duration::from_secs(60));

        let other = CircuitConfig::for_category(ErrorCategory::FileIo);
        assert_eq!(other, CircuitConfig::default());
    }
}
