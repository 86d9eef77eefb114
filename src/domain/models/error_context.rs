// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::ChapterNumber;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Validation,
    Scraping,
    FileIo,
    Driver,
    Processing,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Scraping,
        ErrorCategory::FileIo,
        ErrorCategory::Driver,
        ErrorCategory::Processing,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Scraping => "scraping",
            ErrorCategory::FileIo => "file_io",
            ErrorCategory::Driver => "driver",
            ErrorCategory::Processing => "processing",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// 面向用户的提示信息
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Network problem while contacting the site, retry later",
            ErrorCategory::Validation => "Invalid input, check the chapter number and URL",
            ErrorCategory::Scraping => "The page could not be read, the site layout may have changed",
            ErrorCategory::FileIo => "Could not write output files, check permissions and free disk space",
            ErrorCategory::Driver => "The browser session failed, it will be restarted",
            ErrorCategory::Processing => "An image could not be processed",
            ErrorCategory::Unknown => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误上下文
///
/// 在失败点构造，构造后不可变，由错误处理器消费用于日志和熔断器更新
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    /// 错误类型名称
    pub kind_name: &'static str,
    /// 原始错误信息
    pub message: String,
    /// 错误类别
    pub category: ErrorCategory,
    /// 严重程度
    pub severity: ErrorSeverity,
    /// 发生时间
    pub timestamp: DateTime<Utc>,
    /// 关联章节
    pub chapter: Option<ChapterNumber>,
    /// 关联URL
    pub url: Option<String>,
    /// 已尝试次数
    pub retry_count: u32,
    /// 是否可恢复
    pub recoverable: bool,
    /// 面向用户的提示
    pub user_message: String,
}

impl ErrorContext {
    /// 覆盖错误类别，提示信息随之更新
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self.user_message = category.user_message().to_string();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_chapter(mut self, chapter: ChapterNumber) -> Self {
        self.chapter = Some(chapter);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// 面向用户的完整错误描述
    pub fn describe(&self) -> String {
        format!("{}: {}", self.user_message, self.message)
    }
}
