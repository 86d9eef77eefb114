// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::generic::parse_page_images;
use super::{absolute_url, chapter_number_in, first_srcset_candidate, page_markup, selector, session_markup};
use crate::domain::models::chapter::ChapterMap;
use crate::domain::sites::strategy::{DiscoveryStrategy, PageInput, ScrapeStrategy, SiteId};
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::{debug, info};
use url::Url;

/// 已知使用 Madara 主题的站点
const KNOWN_SITES: [&str; 8] = [
    "manga-scantrad.io",
    "mangas-origines.fr",
    "asurascans.com",
    "reaperscans.com",
    "luminousscans.com",
    "arenascan.com",
    "manhuaus.com",
    "raijin-scans.fr",
];

/// 章节列表容器，按优先级排列
const CHAPTER_CONTAINERS: [&str; 4] = [
    "div#chapterlist",
    "ul.main",
    "div.listing-chapters_wrap",
    "ul.scroll-sm",
];

/// 懒加载图片的地址属性，按优先级排列
const LAZY_ATTRIBUTES: [&str; 4] = ["data-src", "data-lazy-src", "data-srcset", "src"];

/// WordPress Madara 主题适配器
///
/// 章节列表和阅读页都需要浏览器渲染
#[derive(Debug, Clone, Default)]
pub struct MadaraStrategy;

impl MadaraStrategy {
    pub fn new() -> Self {
        Self
    }

    fn score(site: &SiteId) -> u8 {
        if KNOWN_SITES.iter().any(|domain| site.matches(domain)) {
            90
        } else {
            0
        }
    }
}

/// 解析章节列表
///
/// 取第一个存在的容器，逐个 `li` 读取链接和章节号
pub fn parse_chapter_list(html: &str, series_url: &Url) -> Result<ChapterMap, ScrapeError> {
    let document = Html::parse_document(html);
    let items = selector("li")?;
    let links = selector("a[href]")?;

    let mut container = None;
    for css in CHAPTER_CONTAINERS {
        if let Some(found) = document.select(&selector(css)?).next() {
            container = Some(found);
            break;
        }
    }

    let mut chapters = ChapterMap::new();
    let Some(container) = container else {
        return Ok(chapters);
    };

    for item in container.select(&items) {
        let Some(href) = item.select(&links).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let text: String = item.text().collect::<Vec<_>>().join(" ");
        if let (Some(number), Some(url)) = (chapter_number_in(&text), absolute_url(series_url, href)) {
            chapters.insert(number, url);
        }
    }
    Ok(chapters)
}

fn lazy_source(img: &ElementRef<'_>) -> Option<String> {
    LAZY_ATTRIBUTES.iter().find_map(|attr| {
        let value = img.value().attr(attr)?.trim();
        let value = if *attr == "data-srcset" {
            first_srcset_candidate(value)?
        } else {
            value
        };
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// 解析阅读区域中的图片，保持顺序并去重
pub fn parse_reading_images(html: &str, chapter_url: &Url) -> Result<Vec<String>, ScrapeError> {
    let document = Html::parse_document(html);
    let images = selector(".reading-content img")?;

    let mut urls: Vec<String> = Vec::new();
    for img in document.select(&images) {
        let Some(url) = lazy_source(&img).and_then(|src| absolute_url(chapter_url, &src)) else {
            continue;
        };
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Ok(urls)
}

#[async_trait]
impl DiscoveryStrategy for MadaraStrategy {
    fn name(&self) -> &'static str {
        "madara"
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn support_score(&self, site: &SiteId) -> u8 {
        Self::score(site)
    }

    async fn discover(
        &self,
        page: Option<PageInput<'_>>,
        series_url: &Url,
    ) -> Result<ChapterMap, ScrapeError> {
        let html = page_markup(page, "madara").await?;
        let chapters = parse_chapter_list(&html, series_url)?;
        info!(url = %series_url, chapters = chapters.len(), "Madara chapter list parsed");
        Ok(chapters)
    }
}

#[async_trait]
impl ScrapeStrategy for MadaraStrategy {
    fn name(&self) -> &'static str {
        "madara"
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn support_score(&self, site: &SiteId) -> u8 {
        Self::score(site)
    }

    async fn scrape(
        &self,
        session: Option<&dyn WebSession>,
        chapter_url: &Url,
        min_width: u32,
    ) -> Result<Vec<String>, ScrapeError> {
        let html = session_markup(session, "madara").await?;
        let urls = parse_reading_images(&html, chapter_url)?;
        if !urls.is_empty() {
            debug!(url = %chapter_url, images = urls.len(), "Madara reading area parsed");
            return Ok(urls);
        }

        // 阅读区域缺失时退回整页扫描
        let urls = parse_page_images(&html, chapter_url, min_width)?;
        debug!(url = %chapter_url, images = urls.len(), "Madara reading area missing, scanned whole page");
        Ok(urls)
    }
}
