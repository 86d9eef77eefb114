// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::chapter::ChapterNumber;
use crate::utils::errors::{FetchError, SessionError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// 浏览器会话
///
/// 对单个浏览器自动化实例的窄接口封装，每个会话拥有独立的配置目录
#[async_trait]
pub trait WebSession: Send + Sync {
    /// 会话在池中的索引
    fn index(&self) -> usize;

    /// 导航到指定URL并等待页面就绪
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `timeout` - 页面加载超时
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// 获取当前页面源码
    async fn page_source(&self) -> Result<String, SessionError>;

    /// 关闭会话并释放资源
    async fn close(&self) -> Result<(), SessionError>;
}

/// 会话工厂
///
/// 会话池通过工厂创建和重建会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// 创建指定索引的会话
    async fn create(&self, index: usize) -> Result<Box<dyn WebSession>, SessionError>;
}

/// 图片下载请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 图片在章节中的位置
    pub index: usize,
    /// 图片URL
    pub url: String,
    /// Referer 请求头
    pub referer: Option<String>,
    /// 单次尝试超时
    pub timeout: Duration,
    /// 所属章节，用于指标记录
    pub chapter: Option<ChapterNumber>,
}

impl FetchRequest {
    pub fn new(index: usize, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            index,
            url: url.into(),
            referer: None,
            timeout,
            chapter: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_chapter(mut self, chapter: ChapterNumber) -> Self {
        self.chapter = Some(chapter);
        self
    }
}

/// 下载完成的图片
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// 图片在章节中的位置
    pub index: usize,
    /// 图片URL
    pub url: String,
    /// 图片字节
    pub bytes: Bytes,
    /// 成功前失败的次数
    pub retry_count: u32,
}

/// 图片下载器
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 下载单张图片
    ///
    /// # 参数
    ///
    /// * `request` - 下载请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchedImage)` - 下载成功
    /// * `Err(FetchError)` - 所有尝试均失败
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedImage, FetchError>;
}
