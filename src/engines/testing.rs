// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 单元测试用的会话替身

use crate::engines::traits::{SessionFactory, WebSession};
use crate::utils::errors::SessionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 按URL返回固定页面的会话
#[derive(Debug, Default)]
pub struct StaticSession {
    index: usize,
    pages: HashMap<String, String>,
    fallback: String,
    current: Mutex<Option<String>>,
    pub navigations: AtomicUsize,
    pub closed: AtomicBool,
    /// 为 true 时每次导航都失败
    pub broken: AtomicBool,
}

impl StaticSession {
    /// 创建对任何URL都返回 `html` 的会话
    pub fn new(index: usize, html: &str) -> Self {
        Self {
            index,
            fallback: html.to_string(),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl WebSession for StaticSession {
    fn index(&self) -> usize {
        self.index
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(SessionError::Navigation(format!("renderer crashed on {}", url)));
        }
        self.navigations.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = Some(url.to_string());
        Ok(())
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        let current = self.current.lock().clone();
        Ok(current
            .and_then(|url| self.pages.get(&url).cloned())
            .unwrap_or_else(|| self.fallback.clone()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 创建 [`StaticSession`] 的工厂，可让指定次序的创建失败
#[derive(Debug, Default)]
pub struct StaticSessionFactory {
    html: String,
    fail_on: Option<usize>,
    broken_first: AtomicUsize,
    pub created: AtomicUsize,
    pub sessions: Mutex<Vec<Arc<StaticSession>>>,
}

impl StaticSessionFactory {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }

    /// 第 `n` 次（从0开始）创建失败
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// 前 `n` 个会话的导航总是失败
    pub fn with_broken_sessions(self, n: usize) -> Self {
        self.broken_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn closed_count(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.closed.load(Ordering::SeqCst))
            .count()
    }
}

/// 共享底层会话的包装，让测试能观察池中的会话
struct SharedSession(Arc<StaticSession>);

#[async_trait]
impl WebSession for SharedSession {
    fn index(&self) -> usize {
        self.0.index()
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        self.0.navigate(url, timeout).await
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        self.0.page_source().await
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.0.close().await
    }
}

#[async_trait]
impl SessionFactory for StaticSessionFactory {
    async fn create(&self, index: usize) -> Result<Box<dyn WebSession>, SessionError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(n) {
            return Err(SessionError::Launch(format!("session {} failed to start", index)));
        }
        let session = Arc::new(StaticSession::new(index, &self.html));
        if n < self.broken_first.load(Ordering::SeqCst) {
            session.broken.store(true, Ordering::SeqCst);
        }
        self.sessions.lock().push(session.clone());
        Ok(Box::new(SharedSession(session)))
    }
}
