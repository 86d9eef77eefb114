// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::engines::circuit_breaker::Status;
use crate::utils::errors::{FetchError, ScrapeError, SegmentationError, SessionError, ValidationError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// 任意类型名称与消息的测试错误
#[derive(Debug)]
struct NamedError {
    kind: &'static str,
    message: &'static str,
}

impl std::fmt::Display for NamedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl ErrorKind for NamedError {
    fn kind_name(&self) -> &'static str {
        self.kind
    }
}

fn named(kind: &'static str, message: &'static str) -> NamedError {
    NamedError { kind, message }
}

#[test]
fn test_keyword_families_map_to_fixed_verdicts() {
    let handler = ErrorHandler::new();
    let cases = [
        (named("TimeoutError", "read"), ErrorCategory::Network, ErrorSeverity::Warning, true),
        (named("Error", "operation timed out"), ErrorCategory::Network, ErrorSeverity::Warning, true),
        (named("Error", "connection reset by peer"), ErrorCategory::Network, ErrorSeverity::Error, true),
        (named("ValidationError", "bad chapter"), ErrorCategory::Validation, ErrorSeverity::Error, false),
        (named("WebDriverError", "tab crashed"), ErrorCategory::Driver, ErrorSeverity::Error, true),
        (named("IoError", "Permission denied (os error 13)"), ErrorCategory::FileIo, ErrorSeverity::Critical, false),
        (named("IoError", "No space left on device"), ErrorCategory::FileIo, ErrorSeverity::Critical, false),
        (named("ParseError", "unexpected token"), ErrorCategory::Scraping, ErrorSeverity::Warning, true),
        (named("Error", "could not decode payload"), ErrorCategory::Scraping, ErrorSeverity::Warning, true),
        (named("ImageError", "unsupported format"), ErrorCategory::Processing, ErrorSeverity::Warning, true),
        (named("Error", "something odd"), ErrorCategory::Unknown, ErrorSeverity::Error, true),
    ];

    for (err, category, severity, recoverable) in cases {
        let ctx = handler.classify(&err, None, None);
        assert_eq!(ctx.category, category, "category for {:?}", err);
        assert_eq!(ctx.severity, severity, "severity for {:?}", err);
        assert_eq!(ctx.recoverable, recoverable, "recoverable for {:?}", err);
    }
}

#[test]
fn test_priority_order_timeout_beats_validation() {
    let handler = ErrorHandler::new();
    let ctx = handler.classify(&named("ValidationError", "timeout while validating"), None, None);
    assert_eq!(ctx.category, ErrorCategory::Network);
}

#[test]
fn test_crate_errors_classification() {
    let handler = ErrorHandler::new();

    let timeout = FetchError::Timeout { url: "http://x/1.jpg".into() };
    assert_eq!(handler.classify(&timeout, None, None).category, ErrorCategory::Network);

    let invalid = ValidationError::MissingHost;
    let ctx = handler.classify(&invalid, Some(ChapterNumber::new(3.0)), Some("http://"));
    assert_eq!(ctx.category, ErrorCategory::Validation);
    assert!(!ctx.recoverable);
    assert_eq!(ctx.chapter, Some(ChapterNumber::new(3.0)));
    assert_eq!(ctx.url.as_deref(), Some("http://"));

    let crashed = ScrapeError::Session(SessionError::Closed);
    assert_eq!(handler.classify(&crashed, None, None).category, ErrorCategory::Driver);

    let parse = ScrapeError::Parse { what: "chapter list", message: "missing".into() };
    assert_eq!(handler.classify(&parse, None, None).category, ErrorCategory::Scraping);

    let image = SegmentationError::Worker("panicked".into());
    assert_eq!(handler.classify(&image, None, None).category, ErrorCategory::Processing);
}

#[test]
fn test_handle_updates_breaker_except_validation() {
    let handler = ErrorHandler::new();

    for _ in 0..10 {
        let ctx = handler.classify(&ValidationError::EmptyUrl, None, None);
        assert!(!handler.handle(&ctx));
    }
    assert_eq!(handler.breaker().stats(ErrorCategory::Validation).total_failures, 0);

    for _ in 0..3 {
        let ctx = handler.classify(&named("Error", "connection refused"), None, None);
        assert!(handler.handle(&ctx));
    }
    assert_eq!(handler.breaker().status(ErrorCategory::Network), Status::Open);

    handler.reset();
    assert_eq!(handler.breaker().status(ErrorCategory::Network), Status::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_failures() {
    let handler = ErrorHandler::new();
    let policy = RetryPolicy::standard();
    let calls = AtomicU32::new(0);
    let failures = policy.max_attempts - 1;

    let result: Result<&str, NamedError> = handler
        .retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(named("TimeoutError", "slow"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_sleeps_exact_backoff() {
    let handler = ErrorHandler::new();
    let policy = RetryPolicy {
        max_attempts: 4,
        backoff_base: Duration::from_secs(1),
        backoff_factor: 2.0,
    };
    let calls = AtomicU32::new(0);
    let start = tokio::time::Instant::now();

    let result: Result<(), NamedError> = handler
        .retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(named("TimeoutError", "slow")) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // 1 + 2 + 4
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < Duration::from_millis(7100));
    assert_eq!(handler.breaker().stats(ErrorCategory::Network).total_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_on_non_recoverable() {
    let handler = ErrorHandler::new();
    let calls = AtomicU32::new(0);

    let result: Result<(), ValidationError> = handler
        .retry(&RetryPolicy::standard(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ValidationError::EmptyUrl) }
        })
        .await;

    assert_eq!(result, Err(ValidationError::EmptyUrl));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_safe_execute_short_circuits_when_open() {
    let handler = ErrorHandler::new();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
        let value = handler
            .safe_execute(ErrorCategory::Driver, -1, async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(named("Error", "boom"))
            })
            .await;
        assert_eq!(value, -1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(handler.breaker().status(ErrorCategory::Driver), Status::Open);

    let value = handler
        .safe_execute(ErrorCategory::Driver, -1, async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<i32, NamedError>(7)
        })
        .await;
    assert_eq!(value, -1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::advance(Duration::from_secs(60)).await;
    let value = handler
        .safe_execute(ErrorCategory::Driver, -1, async { Ok::<i32, NamedError>(7) })
        .await;
    assert_eq!(value, 7);
    assert_eq!(handler.breaker().status(ErrorCategory::Driver), Status::Closed);
}
