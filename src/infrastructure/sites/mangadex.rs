// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::{ChapterMap, ChapterNumber};
use crate::domain::sites::strategy::{DiscoveryStrategy, PageInput, ScrapeStrategy, SiteId};
use crate::engines::fetcher::random_user_agent;
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const API_BASE: &str = "https://api.mangadex.org";
const SITE_BASE: &str = "https://mangadex.org";
const FEED_PAGE_SIZE: usize = 500;

static TITLE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"title/([a-f0-9\-]{36})").expect("valid title regex"));
static CHAPTER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"chapter/([a-f0-9\-]{36})").expect("valid chapter regex"));

#[derive(Debug, Deserialize)]
struct FeedPage {
    result: String,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    data: Vec<FeedChapter>,
}

#[derive(Debug, Deserialize)]
struct FeedChapter {
    id: String,
    attributes: FeedAttributes,
}

#[derive(Debug, Deserialize)]
struct FeedAttributes {
    chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeServer {
    result: String,
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    data: Vec<String>,
}

/// MangaDex 适配器
///
/// 通过公开 JSON API 发现章节和图片，不需要浏览器会话
#[derive(Debug, Clone)]
pub struct MangaDexStrategy {
    client: reqwest::Client,
    api_base: String,
    site_base: String,
}

impl Default for MangaDexStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl MangaDexStrategy {
    pub fn new() -> Self {
        Self::with_api_base(API_BASE)
    }

    /// 使用指定的 API 地址创建
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(random_user_agent())
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            site_base: SITE_BASE.to_string(),
        }
    }

    /// 获取一页章节列表
    async fn feed_page(&self, title: &str, offset: usize) -> Result<Option<FeedPage>, ScrapeError> {
        let url = format!("{}/manga/{}/feed", self.api_base, title);
        let limit = FEED_PAGE_SIZE.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("translatedLanguage[]", "en"),
                ("order[chapter]", "desc"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "MangaDex feed request rejected");
            return Ok(None);
        }

        let page: FeedPage = response.json().await?;
        if page.result != "ok" {
            warn!(url = %url, result = %page.result, "MangaDex feed returned an error result");
            return Ok(None);
        }
        Ok(Some(page))
    }
}

#[async_trait]
impl DiscoveryStrategy for MangaDexStrategy {
    fn name(&self) -> &'static str {
        "mangadex"
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn support_score(&self, site: &SiteId) -> u8 {
        if site.matches("mangadex.org") {
            100
        } else {
            0
        }
    }

    async fn discover(
        &self,
        _page: Option<PageInput<'_>>,
        series_url: &Url,
    ) -> Result<ChapterMap, ScrapeError> {
        let mut chapters = ChapterMap::new();
        let Some(title) = TITLE_ID
            .captures(series_url.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            debug!(url = %series_url, "No MangaDex title id in URL");
            return Ok(chapters);
        };

        let mut offset = 0;
        let mut total = None;
        while total.map_or(true, |total| offset < total) {
            let Some(page) = self.feed_page(&title, offset).await? else {
                break;
            };
            let received = page.data.len();
            total.get_or_insert(page.total);

            for chapter in page.data {
                let number = chapter
                    .attributes
                    .chapter
                    .as_deref()
                    .and_then(|n| n.parse::<ChapterNumber>().ok());
                if let Some(number) = number {
                    chapters.insert(number, format!("{}/chapter/{}", self.site_base, chapter.id));
                }
            }

            if received == 0 {
                break;
            }
            offset += received;
        }

        info!(title = %title, chapters = chapters.len(), "MangaDex feed discovered");
        Ok(chapters)
    }
}

#[async_trait]
impl ScrapeStrategy for MangaDexStrategy {
    fn name(&self) -> &'static str {
        "mangadex"
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn support_score(&self, site: &SiteId) -> u8 {
        DiscoveryStrategy::support_score(self, site)
    }

    async fn scrape(
        &self,
        _session: Option<&dyn WebSession>,
        chapter_url: &Url,
        _min_width: u32,
    ) -> Result<Vec<String>, ScrapeError> {
        let Some(chapter) = CHAPTER_ID
            .captures(chapter_url.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            return Ok(Vec::new());
        };

        let url = format!("{}/at-home/server/{}", self.api_base, chapter);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "MangaDex at-home request rejected");
            return Ok(Vec::new());
        }

        let server: AtHomeServer = response.json().await?;
        if server.result != "ok" {
            return Ok(Vec::new());
        }

        let base = server.base_url.trim_end_matches('/');
        Ok(server
            .chapter
            .data
            .iter()
            .map(|file| format!("{}/data/{}/{}", base, server.chapter.hash, file))
            .collect())
    }
}
