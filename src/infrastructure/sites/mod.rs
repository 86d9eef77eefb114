// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 站点适配器
//!
//! 每个适配器同时实现章节发现和图片抓取策略，
//! 由 [`registry::StrategyRegistry`] 按站点支持分数排序后依次尝试

pub mod generic;
pub mod madara;
pub mod mangadex;
pub mod registry;

pub use generic::GenericStrategy;
pub use madara::MadaraStrategy;
pub use mangadex::MangaDexStrategy;
pub use registry::{default_registry, ScrapeOutcome, StrategyRegistry};

use crate::domain::models::chapter::ChapterNumber;
use crate::domain::sites::strategy::PageInput;
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use url::Url;

static CHAPTER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Chapter|Chapitre|Ch\.?|Ep)\s*([\d.]+)").expect("valid chapter regex")
});

/// 从链接文字中提取章节号，例如 `Chapter 12.5` -> 12.5
pub(crate) fn chapter_number_in(text: &str) -> Option<ChapterNumber> {
    let captures = CHAPTER_LABEL.captures(text)?;
    let digits = captures.get(1)?.as_str().trim_matches('.');
    digits.parse::<ChapterNumber>().ok()
}

/// 把页面中的链接解析为绝对 http(s) URL
pub(crate) fn absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// 取 `srcset` 中的第一个候选地址
pub(crate) fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
}

/// 解析 CSS 选择器
pub(crate) fn selector(css: &'static str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse {
        what: "selector",
        message: format!("{}: {}", css, e),
    })
}

/// 读取页面源码，需要渲染的策略在没有页面时报错
pub(crate) async fn page_markup(
    page: Option<PageInput<'_>>,
    strategy: &'static str,
) -> Result<String, ScrapeError> {
    match page {
        Some(PageInput::Markup(html)) => Ok(html.to_string()),
        Some(PageInput::Session(session)) => Ok(session.page_source().await?),
        None => Err(ScrapeError::SessionRequired(strategy)),
    }
}

/// 读取会话当前页面的源码
pub(crate) async fn session_markup(
    session: Option<&dyn WebSession>,
    strategy: &'static str,
) -> Result<String, ScrapeError> {
    page_markup(session.map(PageInput::Session), strategy).await
}
