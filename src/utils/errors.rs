// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use thiserror::Error;

pub use crate::domain::repositories::storage_repository::StorageError;

/// 错误类型名称
///
/// 错误分类器按 "类型名称 + 消息" 做关键字匹配，
/// 每个错误类型通过此特质给出稳定的类型名称
pub trait ErrorKind: std::fmt::Display {
    /// 返回稳定的错误类型名称
    fn kind_name(&self) -> &'static str;
}

/// 输入验证错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// URL为空
    #[error("validation failed: URL must not be empty")]
    EmptyUrl,
    /// URL过长
    #[error("validation failed: URL exceeds {max} characters")]
    UrlTooLong { max: usize },
    /// URL无法解析
    #[error("validation failed: malformed URL `{0}`")]
    InvalidUrl(String),
    /// 不支持的协议
    #[error("validation failed: unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
    /// 缺少主机名
    #[error("validation failed: URL has no host")]
    MissingHost,
    /// 章节号越界
    #[error("validation failed: chapter number {0} outside 0..=10000")]
    ChapterOutOfRange(f64),
    /// 数值参数越界
    #[error("validation failed: {field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    /// 不安全的文件名
    #[error("validation failed: unsafe file name `{0}`")]
    UnsafeFileName(String),
    /// 其他验证错误
    #[error("validation failed: {0}")]
    Invalid(String),
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ValidationError::Invalid(errors.to_string())
    }
}

impl ErrorKind for ValidationError {
    fn kind_name(&self) -> &'static str {
        "ValidationError"
    }
}

/// 图片下载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// 请求超时
    #[error("request timed out: {url}")]
    Timeout { url: String },
    /// 连接失败
    #[error("connection failed for {url}: {message}")]
    Connection { url: String, message: String },
    /// 非成功状态码
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },
    /// 读取响应体失败
    #[error("failed to decode response body from {url}: {message}")]
    Body { url: String, message: String },
    /// 其他请求错误
    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// 将 reqwest 错误映射为下载错误
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Connection {
                url,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url,
                message: err.to_string(),
            }
        } else {
            FetchError::Request {
                url,
                message: err.to_string(),
            }
        }
    }

    /// 出错的URL
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Connection { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::Request { url, .. } => url,
        }
    }
}

impl ErrorKind for FetchError {
    fn kind_name(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "TimeoutError",
            FetchError::Connection { .. } => "ConnectionError",
            FetchError::Status { .. } => "HttpStatusError",
            FetchError::Body { .. } => "DecodeError",
            FetchError::Request { .. } => "RequestError",
        }
    }
}

/// 浏览器会话错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// 浏览器启动失败
    #[error("browser launch failed: {0}")]
    Launch(String),
    /// 页面加载超时
    #[error("page load timeout after {0:?}: {1}")]
    NavigationTimeout(Duration, String),
    /// 导航失败
    #[error("browser navigation failed: {0}")]
    Navigation(String),
    /// 页面不可用
    #[error("browser page unavailable: {0}")]
    Page(String),
    /// 会话已关闭
    #[error("browser session already closed")]
    Closed,
    /// 会话池尚未启动
    #[error("browser session pool is not running")]
    PoolNotStarted,
    /// 会话索引越界
    #[error("browser session index {index} out of range for pool of {size}")]
    IndexOutOfRange { index: usize, size: usize },
}

impl ErrorKind for SessionError {
    fn kind_name(&self) -> &'static str {
        "WebDriverError"
    }
}

/// 站点抓取错误
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// 浏览器会话错误
    #[error(transparent)]
    Session(#[from] SessionError),
    /// 站点API请求失败
    #[error("site API request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// 页面或响应解析失败
    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },
    /// 策略需要浏览器会话
    #[error("strategy `{0}` requires a browser session")]
    SessionRequired(&'static str),
    /// 没有可用策略
    #[error("no scrape strategy produced results for `{0}`")]
    NoStrategy(String),
}

impl ScrapeError {
    /// 是否为浏览器驱动层面的失败（需要重启会话）
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, ScrapeError::Session(_))
    }
}

impl ErrorKind for ScrapeError {
    fn kind_name(&self) -> &'static str {
        match self {
            ScrapeError::Session(e) => e.kind_name(),
            ScrapeError::Http(e) => e.kind_name(),
            ScrapeError::Parse { .. } => "ParseError",
            ScrapeError::SessionRequired(_) => "WebDriverError",
            ScrapeError::NoStrategy(_) => "ScrapeError",
        }
    }
}

/// 图片分割错误
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// 图片解码失败
    #[error("unreadable image data: {0}")]
    Decode(#[source] image::ImageError),
    /// 图片编码失败
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    /// 后台任务失败
    #[error("image worker failed: {0}")]
    Worker(String),
}

impl ErrorKind for SegmentationError {
    fn kind_name(&self) -> &'static str {
        "ImageError"
    }
}

/// 清理服务错误
#[derive(Error, Debug)]
pub enum CleanerError {
    /// 请求失败
    #[error("cleaning service request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// 非成功状态码
    #[error("cleaning service returned HTTP status {0}")]
    Status(u16),
    /// 服务地址无效
    #[error("invalid cleaning service URL `{0}`")]
    InvalidUrl(String),
}

impl ErrorKind for CleanerError {
    fn kind_name(&self) -> &'static str {
        match self {
            CleanerError::Request(e) => e.kind_name(),
            CleanerError::Status(_) => "HttpStatusError",
            CleanerError::InvalidUrl(_) => "ConfigError",
        }
    }
}

impl ErrorKind for StorageError {
    fn kind_name(&self) -> &'static str {
        "IoError"
    }
}

impl ErrorKind for std::io::Error {
    fn kind_name(&self) -> &'static str {
        match self.kind() {
            std::io::ErrorKind::TimedOut => "TimeoutError",
            std::io::ErrorKind::PermissionDenied => "PermissionError",
            _ => "IoError",
        }
    }
}

impl ErrorKind for image::ImageError {
    fn kind_name(&self) -> &'static str {
        "ImageError"
    }
}

impl ErrorKind for reqwest::Error {
    fn kind_name(&self) -> &'static str {
        if self.is_timeout() {
            "TimeoutError"
        } else if self.is_connect() {
            "ConnectionError"
        } else if self.is_decode() {
            "DecodeError"
        } else {
            "RequestError"
        }
    }
}

/// 章节流水线错误
///
/// 汇总单个章节处理过程中可能出现的所有错误，
/// 由编排器转换为章节结果而不会向上传播
#[derive(Error, Debug)]
pub enum ChapterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// 未找到图片
    #[error("no images found at {0}")]
    NoImages(String),
    /// 所有图片下载失败
    #[error("all {0} image downloads failed")]
    NothingDownloaded(usize),
}

impl ErrorKind for ChapterError {
    fn kind_name(&self) -> &'static str {
        match self {
            ChapterError::Validation(e) => e.kind_name(),
            ChapterError::Scrape(e) => e.kind_name(),
            ChapterError::Session(e) => e.kind_name(),
            ChapterError::Fetch(e) => e.kind_name(),
            ChapterError::Segmentation(e) => e.kind_name(),
            ChapterError::Storage(e) => e.kind_name(),
            ChapterError::NoImages(_) => "ScrapeError",
            ChapterError::NothingDownloaded(_) => "DownloadError",
        }
    }
}

impl ErrorKind for anyhow::Error {
    fn kind_name(&self) -> &'static str {
        if let Some(e) = self.downcast_ref::<ChapterError>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<ValidationError>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<FetchError>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<SessionError>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<ScrapeError>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<std::io::Error>() {
            e.kind_name()
        } else if let Some(e) = self.downcast_ref::<image::ImageError>() {
            e.kind_name()
        } else {
            "Error"
        }
    }
}
