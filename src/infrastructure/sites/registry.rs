// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::{GenericStrategy, MadaraStrategy, MangaDexStrategy};
use crate::domain::sites::strategy::{DiscoveryStrategy, ScrapeStrategy, SiteId};
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// 抓取链的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeOutcome {
    /// 产出图片列表的策略，全部落空时为 None
    pub strategy: Option<&'static str>,
    /// 图片URL，按阅读顺序排列
    pub urls: Vec<String>,
}

/// 站点策略注册表
///
/// 按站点支持分数从高到低给出候选策略，兜底策略总是排在最后
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    discovery: Vec<Arc<dyn DiscoveryStrategy>>,
    scrape: Vec<Arc<dyn ScrapeStrategy>>,
    discovery_fallback: Option<Arc<dyn DiscoveryStrategy>>,
    scrape_fallback: Option<Arc<dyn ScrapeStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册章节发现策略
    pub fn register_discovery(mut self, strategy: Arc<dyn DiscoveryStrategy>) -> Self {
        self.discovery.push(strategy);
        self
    }

    /// 注册图片抓取策略
    pub fn register_scrape(mut self, strategy: Arc<dyn ScrapeStrategy>) -> Self {
        self.scrape.push(strategy);
        self
    }

    pub fn with_discovery_fallback(mut self, strategy: Arc<dyn DiscoveryStrategy>) -> Self {
        self.discovery_fallback = Some(strategy);
        self
    }

    pub fn with_scrape_fallback(mut self, strategy: Arc<dyn ScrapeStrategy>) -> Self {
        self.scrape_fallback = Some(strategy);
        self
    }

    /// 站点的章节发现候选
    ///
    /// # 参数
    ///
    /// * `site` - 站点标识
    ///
    /// # 返回值
    ///
    /// 支持分数大于0的策略按分数降序排列，兜底策略在最后
    pub fn discovery_chain(&self, site: &SiteId) -> Vec<Arc<dyn DiscoveryStrategy>> {
        let mut candidates: Vec<(u8, Arc<dyn DiscoveryStrategy>)> = self
            .discovery
            .iter()
            .map(|s| (s.support_score(site), s.clone()))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序，同分时保持注册顺序
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut chain: Vec<_> = candidates.into_iter().map(|(_, s)| s).collect();
        chain.extend(self.discovery_fallback.clone());
        chain
    }

    /// 站点的图片抓取候选，排序规则同 [`Self::discovery_chain`]
    pub fn scrape_chain(&self, site: &SiteId) -> Vec<Arc<dyn ScrapeStrategy>> {
        let mut candidates: Vec<(u8, Arc<dyn ScrapeStrategy>)> = self
            .scrape
            .iter()
            .map(|s| (s.support_score(site), s.clone()))
            .filter(|(score, _)| *score > 0)
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut chain: Vec<_> = candidates.into_iter().map(|(_, s)| s).collect();
        chain.extend(self.scrape_fallback.clone());
        chain
    }

    /// 站点的章节页是否需要浏览器会话，由首选抓取策略决定
    pub fn scrape_requires_session(&self, site: &SiteId) -> bool {
        self.scrape_chain(site)
            .first()
            .is_some_and(|s| s.requires_session())
    }

    /// 站点的作品页是否需要浏览器会话，由首选发现策略决定
    pub fn discovery_requires_session(&self, site: &SiteId) -> bool {
        self.discovery_chain(site)
            .first()
            .is_some_and(|s| s.requires_session())
    }

    /// 依次执行抓取链，直到某个策略给出非空结果
    ///
    /// 空结果和普通错误都会继续尝试下一个策略；
    /// 浏览器会话错误直接返回，由调用方重启会话
    ///
    /// # 参数
    ///
    /// * `session` - 已导航到章节页的浏览器会话
    /// * `chapter_url` - 章节URL
    /// * `min_width` - 图片最小宽度
    pub async fn run_scrape_chain(
        &self,
        session: Option<&dyn WebSession>,
        chapter_url: &Url,
        min_width: u32,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let site = SiteId::from_url(chapter_url);

        for strategy in self.scrape_chain(&site) {
            let name = strategy.name();
            if strategy.requires_session() && session.is_none() {
                debug!(strategy = name, "Skipping strategy without a browser session");
                continue;
            }

            match strategy.scrape(session, chapter_url, min_width).await {
                Ok(urls) if !urls.is_empty() => {
                    counter!("strategy_attempts_total", "strategy" => name, "outcome" => "hit")
                        .increment(1);
                    info!(strategy = name, images = urls.len(), "Strategy produced images");
                    return Ok(ScrapeOutcome {
                        strategy: Some(name),
                        urls,
                    });
                }
                Ok(_) => {
                    counter!("strategy_attempts_total", "strategy" => name, "outcome" => "empty")
                        .increment(1);
                    debug!(strategy = name, "Strategy found no images");
                }
                Err(e) if e.is_driver_failure() => return Err(e),
                Err(e) => {
                    counter!("strategy_attempts_total", "strategy" => name, "outcome" => "error")
                        .increment(1);
                    warn!(strategy = name, url = %chapter_url, "Strategy failed: {}", e);
                }
            }
        }

        Ok(ScrapeOutcome::default())
    }
}

/// 内置站点适配器组成的注册表
pub fn default_registry() -> StrategyRegistry {
    let mangadex = Arc::new(MangaDexStrategy::new());
    let madara = Arc::new(MadaraStrategy::new());
    let generic = Arc::new(GenericStrategy::new());

    StrategyRegistry::new()
        .register_discovery(mangadex.clone())
        .register_discovery(madara.clone())
        .register_scrape(mangadex)
        .register_scrape(madara)
        .with_discovery_fallback(generic.clone())
        .with_scrape_fallback(generic)
}
