// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::ChapterMap;
use crate::domain::sites::strategy::{PageInput, SiteId};
use crate::engines::traits::WebSession;
use crate::infrastructure::sites::StrategyRegistry;
use crate::utils::errors::ScrapeError;
use crate::utils::validators;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// 发现作品的章节列表
///
/// 按注册表给出的顺序尝试发现策略，第一个给出非空结果的策略胜出。
/// 需要渲染的策略共享同一次页面导航
///
/// # 参数
///
/// * `registry` - 站点策略注册表
/// * `session` - 浏览器会话，不需要渲染的站点可为 None
/// * `series_url` - 作品主页URL
/// * `page_timeout` - 页面加载超时
///
/// # 返回值
///
/// * `Ok(ChapterMap)` - 章节号和URL都通过验证的章节映射
/// * `Err(ScrapeError)` - 浏览器故障或所有策略都没有结果
pub async fn discover_series(
    registry: &StrategyRegistry,
    session: Option<&dyn WebSession>,
    series_url: &Url,
    page_timeout: Duration,
) -> Result<ChapterMap, ScrapeError> {
    let site = SiteId::from_url(series_url);
    let mut navigated = false;

    for strategy in registry.discovery_chain(&site) {
        let name = strategy.name();
        let page = if strategy.requires_session() {
            let Some(session) = session else {
                debug!(strategy = name, "Skipping discovery strategy without a browser session");
                continue;
            };
            if !navigated {
                session.navigate(series_url.as_str(), page_timeout).await?;
                navigated = true;
            }
            Some(PageInput::Session(session))
        } else {
            None
        };

        let found = match strategy.discover(page, series_url).await {
            Ok(found) => found,
            Err(e) if e.is_driver_failure() => return Err(e),
            Err(e) => {
                warn!(strategy = name, url = %series_url, "Discovery strategy failed: {}", e);
                continue;
            }
        };

        let discovered = found.len();
        let chapters: ChapterMap = found
            .into_iter()
            .filter(|(chapter, url)| {
                let valid = validators::validate_chapter_number(*chapter).is_ok()
                    && validators::validate_url(url).is_ok();
                if !valid {
                    debug!(chapter = %chapter, url = %url, "Dropping invalid chapter entry");
                }
                valid
            })
            .collect();

        if chapters.is_empty() {
            debug!(strategy = name, discovered, "Discovery strategy found no chapters");
            continue;
        }

        info!(strategy = name, chapters = chapters.len(), url = %series_url, "Chapters discovered");
        return Ok(chapters);
    }

    Err(ScrapeError::NoStrategy(series_url.to_string()))
}
