// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::chapter::ChapterMap;
use crate::engines::traits::WebSession;
use crate::utils::errors::ScrapeError;
use async_trait::async_trait;
use std::fmt;
use url::Url;

/// 规范化站点标识
///
/// 从URL主机名解析一次（小写、去掉 `www.` 前缀），用于策略查找
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId(String);

impl SiteId {
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        Self(host)
    }

    pub fn parse(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(|u| Self::from_url(&u))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 主机名等于该域名或为其子域名
    pub fn matches(&self, domain: &str) -> bool {
        self.0 == domain
            || self
                .0
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 发现策略的页面输入
///
/// 需要渲染的站点使用浏览器会话，其余可直接传入页面源码
pub enum PageInput<'a> {
    /// 实时浏览器会话
    Session(&'a dyn WebSession),
    /// 原始HTML
    Markup(&'a str),
}

/// 章节发现策略
///
/// 给定页面句柄或HTML，产出章节号到章节URL的有序映射。
/// 空映射表示该策略对此页面没有把握，调用方会尝试下一个策略
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// 策略名称
    fn name(&self) -> &'static str;

    /// 是否需要浏览器会话
    fn requires_session(&self) -> bool;

    /// 对站点的支持分数（0 表示不支持）
    fn support_score(&self, site: &SiteId) -> u8;

    /// 发现章节
    ///
    /// # 参数
    ///
    /// * `page` - 页面输入，无需渲染的策略可忽略
    /// * `series_url` - 作品主页URL
    ///
    /// # 返回值
    ///
    /// 章节号到绝对URL的映射
    async fn discover(
        &self,
        page: Option<PageInput<'_>>,
        series_url: &Url,
    ) -> Result<ChapterMap, ScrapeError>;
}

/// 图片抓取策略
///
/// 给定章节URL（需要时附带浏览器会话），产出有序的原始图片URL列表。
/// 空列表是统一的 "无结果" 信号
#[async_trait]
pub trait ScrapeStrategy: Send + Sync {
    /// 策略名称
    fn name(&self) -> &'static str;

    /// 是否需要浏览器会话
    fn requires_session(&self) -> bool;

    /// 对站点的支持分数（0 表示不支持）
    fn support_score(&self, site: &SiteId) -> u8;

    /// 抓取章节图片URL
    ///
    /// # 参数
    ///
    /// * `session` - 浏览器会话，无需渲染的策略为 None
    /// * `chapter_url` - 章节URL
    /// * `min_width` - 图片最小宽度
    ///
    /// # 返回值
    ///
    /// 按阅读顺序排列的图片URL
    async fn scrape(
        &self,
        session: Option<&dyn WebSession>,
        chapter_url: &Url,
        min_width: u32,
    ) -> Result<Vec<String>, ScrapeError>;
}
