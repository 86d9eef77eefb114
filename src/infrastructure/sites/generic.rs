// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{absolute_url, chapter_number_in, page_markup, selector, session_markup};
use crate::domain::models::chapter::ChapterMap;
use crate::domain::sites::strategy::{DiscoveryStrategy, PageInput, ScrapeStrategy, SiteId};
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use async_trait::async_trait;
use scraper::Html;
use tracing::debug;
use url::Url;

/// 链接地址中出现这些片段时才视为章节链接
const CHAPTER_HINTS: [&str; 4] = ["chapter", "chap", "chapitre", "ep"];

/// 通用适配器
///
/// 不依赖任何站点结构，作为所有站点的最后一个候选
#[derive(Debug, Clone, Default)]
pub struct GenericStrategy;

impl GenericStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// 收集页面中所有看起来像章节的链接
pub fn parse_chapter_links(html: &str, series_url: &Url) -> Result<ChapterMap, ScrapeError> {
    let document = Html::parse_document(html);
    let links = selector("a[href]")?;

    let mut chapters = ChapterMap::new();
    for link in document.select(&links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let lowered = href.to_ascii_lowercase();
        if !CHAPTER_HINTS.iter().any(|hint| lowered.contains(hint)) {
            continue;
        }
        let text: String = link.text().collect::<Vec<_>>().join(" ");
        if let (Some(number), Some(url)) = (chapter_number_in(&text), absolute_url(series_url, href)) {
            chapters.entry(number).or_insert(url);
        }
    }
    Ok(chapters)
}

/// 图片声明的最小高度
const MIN_IMAGE_HEIGHT: u32 = 250;
/// 漫画页面的最小高宽比，更扁的图片多为横幅
const MIN_PAGE_RATIO: f64 = 1.1;

fn declared_size(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.trim().trim_end_matches("px").parse::<u32>().ok())
}

/// 按声明尺寸判断图片是否像漫画页面，未声明的尺寸不做限制
fn looks_like_page(width: Option<u32>, height: Option<u32>, min_width: u32) -> bool {
    if width.is_some_and(|w| w < min_width) || height.is_some_and(|h| h < MIN_IMAGE_HEIGHT) {
        return false;
    }
    match (width, height) {
        (Some(w), Some(h)) if w > 0 => h as f64 / w as f64 >= MIN_PAGE_RATIO,
        _ => true,
    }
}

/// 收集页面中所有绝对地址的图片
///
/// 声明的宽度小于 `min_width`、高度小于 250 或高宽比小于 1.1 的图片视为图标或广告
pub fn parse_page_images(
    html: &str,
    page_url: &Url,
    min_width: u32,
) -> Result<Vec<String>, ScrapeError> {
    let document = Html::parse_document(html);
    let images = selector("img")?;

    let mut urls: Vec<String> = Vec::new();
    for img in document.select(&images) {
        let element = img.value();
        let width = declared_size(element.attr("width"));
        let height = declared_size(element.attr("height"));
        if !looks_like_page(width, height, min_width) {
            continue;
        }
        let Some(src) = element.attr("data-src").or_else(|| element.attr("src")) else {
            continue;
        };
        let src = src.trim();
        if !(src.starts_with("http://") || src.starts_with("https://") || src.starts_with("//")) {
            continue;
        }
        let Some(url) = absolute_url(page_url, src) else {
            continue;
        };
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

#[async_trait]
impl DiscoveryStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn support_score(&self, _site: &SiteId) -> u8 {
        1
    }

    async fn discover(
        &self,
        page: Option<PageInput<'_>>,
        series_url: &Url,
    ) -> Result<ChapterMap, ScrapeError> {
        let html = page_markup(page, "generic").await?;
        parse_chapter_links(&html, series_url)
    }
}

#[async_trait]
impl ScrapeStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn support_score(&self, _site: &SiteId) -> u8 {
        1
    }

    async fn scrape(
        &self,
        session: Option<&dyn WebSession>,
        chapter_url: &Url,
        min_width: u32,
    ) -> Result<Vec<String>, ScrapeError> {
        let html = session_markup(session, "generic").await?;
        let urls = parse_page_images(&html, chapter_url, min_width)?;
        debug!(url = %chapter_url, images = urls.len(), "Generic image scan finished");
        Ok(urls)
    }
}
