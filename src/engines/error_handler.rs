// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::ChapterNumber;
use crate::domain::models::error_context::{ErrorCategory, ErrorContext, ErrorSeverity};
use crate::engines::circuit_breaker::CircuitBreaker;
use crate::utils::errors::ErrorKind;
use crate::utils::retry_policy::RetryPolicy;
use chrono::Utc;
use metrics::counter;
use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

static GLOBAL_HANDLER: Lazy<Arc<ErrorHandler>> = Lazy::new(|| Arc::new(ErrorHandler::new()));

/// 分类规则：(类别, 严重程度, 是否可恢复)
type Verdict = (ErrorCategory, ErrorSeverity, bool);

/// 错误处理器
///
/// 将任意错误分类为类别和严重程度，记录日志，并维护每个类别的熔断器
#[derive(Clone, Default)]
pub struct ErrorHandler {
    breaker: CircuitBreaker,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::with_breaker(CircuitBreaker::new())
    }

    pub fn with_breaker(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }

    /// 进程级默认实例
    ///
    /// 仅为方便提供，组件都通过构造函数注入处理器
    pub fn global() -> Arc<ErrorHandler> {
        GLOBAL_HANDLER.clone()
    }

    /// 熔断器
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// 重置所有熔断器
    pub fn reset(&self) {
        self.breaker.reset_all();
    }

    /// 错误分类
    ///
    /// 按优先级对类型名称和消息做关键字匹配，顺序固定：
    /// timeout, connection, validation, browser, permission/access, disk/space,
    /// parse/decode, image, 其余
    ///
    /// # 参数
    ///
    /// * `err` - 错误
    /// * `chapter` - 关联章节
    /// * `url` - 关联URL
    pub fn classify<E>(&self, err: &E, chapter: Option<ChapterNumber>, url: Option<&str>) -> ErrorContext
    where
        E: ErrorKind + ?Sized,
    {
        let kind_name = err.kind_name();
        let message = err.to_string();
        let (category, severity, recoverable) = classify_parts(kind_name, &message);

        ErrorContext {
            kind_name,
            message,
            category,
            severity,
            timestamp: Utc::now(),
            chapter,
            url: url.map(str::to_string),
            retry_count: 0,
            recoverable,
            user_message: category.user_message().to_string(),
        }
    }

    /// 处理错误
    ///
    /// 按严重程度记录日志；除验证错误外，更新对应类别的熔断器
    ///
    /// # 返回值
    ///
    /// 错误是否可恢复
    pub fn handle(&self, ctx: &ErrorContext) -> bool {
        let chapter = ctx.chapter.map(|c| c.to_string()).unwrap_or_default();
        let url = ctx.url.as_deref().unwrap_or_default();
        match ctx.severity {
            ErrorSeverity::Info => info!(
                category = %ctx.category, chapter = %chapter, url = %url,
                retry_count = ctx.retry_count, kind = ctx.kind_name, "{}", ctx.message
            ),
            ErrorSeverity::Warning => warn!(
                category = %ctx.category, chapter = %chapter, url = %url,
                retry_count = ctx.retry_count, kind = ctx.kind_name, "{}", ctx.message
            ),
            ErrorSeverity::Error => error!(
                category = %ctx.category, chapter = %chapter, url = %url,
                retry_count = ctx.retry_count, kind = ctx.kind_name, "{}", ctx.message
            ),
            ErrorSeverity::Critical => error!(
                category = %ctx.category, chapter = %chapter, url = %url,
                retry_count = ctx.retry_count, kind = ctx.kind_name, "CRITICAL: {}", ctx.message
            ),
        }

        counter!("errors_total", "category" => ctx.category.as_str()).increment(1);

        if ctx.category != ErrorCategory::Validation {
            self.breaker.record_failure(ctx.category);
        }

        ctx.recoverable
    }

    /// 带指数退避的重试
    ///
    /// 每次失败都会分类并记录；不可恢复的错误立即停止重试。
    /// 最终失败以 `retry_count = 尝试次数` 交给 `handle` 处理后原样返回
    ///
    /// # 参数
    ///
    /// * `policy` - 重试策略
    /// * `operation` - 每次尝试调用一次的操作
    pub async fn retry<T, E, F, Fut>(&self, policy: &RetryPolicy, operation: F) -> Result<T, E>
    where
        E: ErrorKind,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.retry_for(policy, None, None, operation).await
    }

    /// 带章节和URL上下文的重试，语义同 `retry`
    pub async fn retry_for<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy,
        chapter: Option<ChapterNumber>,
        url: Option<&str>,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: ErrorKind,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let ctx = self.classify(&err, chapter, url);
                    let last = attempt + 1 >= max_attempts;
                    if last || !ctx.recoverable {
                        let ctx = ctx.with_retry_count(attempt + 1);
                        self.handle(&ctx);
                        return Err(err);
                    }

                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        category = %ctx.category,
                        "Attempt failed: {}, retrying in {:?}",
                        ctx.message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// 受熔断器保护的执行
    ///
    /// 熔断打开时不调用操作直接返回默认值；失败时按指定类别记录并返回默认值
    ///
    /// # 参数
    ///
    /// * `category` - 熔断类别
    /// * `default` - 熔断或失败时的返回值
    /// * `operation` - 要执行的操作
    pub async fn safe_execute<T, E, Fut>(&self, category: ErrorCategory, default: T, operation: Fut) -> T
    where
        E: ErrorKind,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.breaker.can_execute(category) {
            warn!(category = %category, "Circuit open, skipping operation");
            return default;
        }

        match operation.await {
            Ok(value) => {
                self.breaker.record_success(category);
                value
            }
            Err(err) => {
                let ctx = self.classify(&err, None, None).with_category(category);
                self.handle(&ctx);
                default
            }
        }
    }
}

/// 关键字分类规则
fn classify_parts(kind_name: &str, message: &str) -> Verdict {
    let kind = kind_name.to_lowercase();
    let msg = message.to_lowercase();
    let either = |needle: &str| kind.contains(needle) || msg.contains(needle);

    if either("timeout") || either("timed out") {
        (ErrorCategory::Network, ErrorSeverity::Warning, true)
    } else if either("connection") {
        (ErrorCategory::Network, ErrorSeverity::Error, true)
    } else if kind.contains("validation") {
        (ErrorCategory::Validation, ErrorSeverity::Error, false)
    } else if ["webdriver", "browser", "chromium", "selenium"]
        .iter()
        .any(|k| kind.contains(k))
    {
        (ErrorCategory::Driver, ErrorSeverity::Error, true)
    } else if msg.contains("permission") || msg.contains("access") || kind.contains("permission")
    {
        (ErrorCategory::FileIo, ErrorSeverity::Critical, false)
    } else if msg.contains("disk") || msg.contains("space") {
        (ErrorCategory::FileIo, ErrorSeverity::Critical, false)
    } else if either("parse") || either("decode") {
        (ErrorCategory::Scraping, ErrorSeverity::Warning, true)
    } else if msg.contains("image") || kind.contains("image") {
        (ErrorCategory::Processing, ErrorSeverity::Warning, true)
    } else {
        (ErrorCategory::Unknown, ErrorSeverity::Error, true)
    }
}

#[cfg(test)]
#[path = "error_handler_test.rs"]
mod tests;
