// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 重试策略配置
///
/// 第 `attempt` 次失败（从 0 开始）后的等待时间为 `backoff_base * backoff_factor^attempt`，
/// 最后一次尝试失败后不再等待
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 退避基数
    pub backoff_base: Duration,
    /// 退避乘数
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 创建标准重试策略
    pub fn standard() -> Self {
        Self::default()
    }

    /// 图片下载使用的重试策略：4 次尝试，0.5 秒起步
    pub fn fetcher() -> Self {
        Self {
            max_attempts: 4,
            backoff_base: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// 计算第 `attempt` 次失败后的退避时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// 第 `attempt` 次失败后是否还有下一次尝试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// 所有尝试都失败时的总等待时间
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.delay_for(i))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_exponential() {
        let policy = RetryPolicy::fetcher();

        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::fetcher();

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3)); // max_attempts = 4
    }

    #[test]
    fn test_total_backoff() {
        let policy = RetryPolicy::standard();
        // 2 + 4
        assert_eq!(policy.total_backoff(), Duration::from_secs(6));
        assert_eq!(RetryPolicy::fetcher().total_backoff(), Duration::from_millis(3500));
        assert_eq!(
            RetryPolicy::standard().with_max_attempts(0).max_attempts,
            1
        );
    }
}
