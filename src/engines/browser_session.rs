// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{SessionFactory, WebSession};
use crate::utils::errors::SessionError;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// 会话的浏览器配置目录
#[derive(Debug)]
pub enum ProfileDir {
    /// 跨运行保留的目录
    Persistent(PathBuf),
    /// 随会话释放而删除的临时目录
    Temporary(TempDir),
}

impl ProfileDir {
    /// 为指定索引的会话选择配置目录
    ///
    /// 配置了 profile_id 时使用 `profiles/<id>/session_<n>`，否则创建唯一的临时目录
    pub fn for_session(settings: &BrowserSettings, index: usize) -> std::io::Result<Self> {
        match settings.profile_dir(index) {
            Some(path) => {
                std::fs::create_dir_all(&path)?;
                Ok(ProfileDir::Persistent(path))
            }
            None => tempfile::Builder::new()
                .prefix(&format!("panelrs-session-{}-", index))
                .tempdir()
                .map(ProfileDir::Temporary),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ProfileDir::Persistent(path) => path,
            ProfileDir::Temporary(dir) => dir.path(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, ProfileDir::Temporary(_))
    }
}

/// 基于 chromiumoxide 的浏览器会话
///
/// 每个会话独占一个浏览器进程和一个页面
pub struct ChromiumSession {
    index: usize,
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    profile: ProfileDir,
}

impl ChromiumSession {
    /// 启动浏览器并打开空白页面
    ///
    /// # 参数
    ///
    /// * `index` - 会话在池中的索引
    /// * `settings` - 浏览器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ChromiumSession)` - 启动成功
    /// * `Err(SessionError::Launch)` - 配置目录或浏览器启动失败
    pub async fn launch(index: usize, settings: &BrowserSettings) -> Result<Self, SessionError> {
        // 之后任一步失败，临时目录随 profile 一起删除
        let profile = ProfileDir::for_session(settings, index)
            .map_err(|e| SessionError::Launch(format!("profile directory: {}", e)))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile.path())
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .request_timeout(settings.page_load_timeout())
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        info!(
            index,
            profile = %profile.path().display(),
            headless = settings.headless,
            "Browser session started"
        );

        Ok(Self {
            index,
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            handler: parking_lot::Mutex::new(Some(handler)),
            closed: AtomicBool::new(false),
            profile,
        })
    }

    pub fn profile(&self) -> &ProfileDir {
        &self.profile
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WebSession for ChromiumSession {
    fn index(&self) -> usize {
        self.index
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        self.ensure_open()?;

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(SessionError::NavigationTimeout(timeout, url.to_string())),
            Ok(Err(e)) => return Err(SessionError::Navigation(e.to_string())),
            Ok(Ok(_)) => {}
        }

        // 等待页面脚本稳定
        let settle = rand::random_range(500..=1500);
        tokio::time::sleep(Duration::from_millis(settle)).await;

        // 触发懒加载图片
        self.page
            .evaluate(SCROLL_TO_BOTTOM)
            .await
            .map_err(|e| SessionError::Page(e.to_string()))?;

        debug!(index = self.index, url, settle_ms = settle, "Page loaded");
        Ok(())
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| SessionError::Page(e.to_string()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                result = Err(SessionError::Page(e.to_string()));
            }
            if let Err(e) = browser.wait().await {
                debug!(index = self.index, "Browser process wait failed: {}", e);
            }
        }

        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }

        if self.profile.is_temporary() {
            if let Err(e) = tokio::fs::remove_dir_all(self.profile.path()).await {
                warn!(
                    index = self.index,
                    profile = %self.profile.path().display(),
                    "Failed to remove temporary profile: {}",
                    e
                );
            }
        }

        info!(index = self.index, "Browser session closed");
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.get_mut().take() {
            handler.abort();
        }
    }
}

/// 创建 [`ChromiumSession`] 的工厂
#[derive(Debug, Clone, Default)]
pub struct ChromiumSessionFactory {
    settings: BrowserSettings,
}

impl ChromiumSessionFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn create(&self, index: usize) -> Result<Box<dyn WebSession>, SessionError> {
        let session = ChromiumSession::launch(index, &self.settings).await?;
        Ok(Box::new(session))
    }
}
