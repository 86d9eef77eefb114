// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{SessionFactory, WebSession};
use crate::utils::errors::SessionError;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 浏览器会话池
///
/// 会话按索引分配给任务，同一索引的会话同一时间只能被一个任务使用，
/// 该约束由编排器的分配方式保证，池本身不加锁
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    slots: Vec<RwLock<Arc<dyn WebSession>>>,
    running: AtomicBool,
}

impl SessionPool {
    /// 依次启动 `size` 个会话
    ///
    /// 相邻会话之间等待 `start_delay`，任何一个会话启动失败都会关闭
    /// 已启动的会话并返回错误，不会产生不完整的会话池
    ///
    /// # 参数
    ///
    /// * `factory` - 会话工厂
    /// * `size` - 会话数量，至少为1
    /// * `start_delay` - 相邻会话的启动间隔
    pub async fn start(
        factory: Arc<dyn SessionFactory>,
        size: usize,
        start_delay: Duration,
    ) -> Result<Self, SessionError> {
        let size = size.max(1);
        let mut sessions: Vec<Arc<dyn WebSession>> = Vec::with_capacity(size);

        for index in 0..size {
            if index > 0 && !start_delay.is_zero() {
                tokio::time::sleep(start_delay).await;
            }

            match factory.create(index).await {
                Ok(session) => sessions.push(Arc::from(session)),
                Err(e) => {
                    error!(index, "Failed to start browser session: {}", e);
                    for session in &sessions {
                        if let Err(close_err) = session.close().await {
                            warn!(index = session.index(), "Failed to close session: {}", close_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        gauge!("browser_sessions_active").set(size as f64);
        info!(size, "Browser session pool started");

        Ok(Self {
            factory,
            slots: sessions.into_iter().map(RwLock::new).collect(),
            running: AtomicBool::new(true),
        })
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 获取指定索引的会话
    pub fn acquire(&self, index: usize) -> Result<Arc<dyn WebSession>, SessionError> {
        if !self.is_running() {
            return Err(SessionError::PoolNotStarted);
        }
        self.slots
            .get(index)
            .map(|slot| slot.read().clone())
            .ok_or(SessionError::IndexOutOfRange {
                index,
                size: self.slots.len(),
            })
    }

    /// 关闭并重建指定索引的会话
    ///
    /// # 返回值
    ///
    /// * `Ok(Arc<dyn WebSession>)` - 新会话
    /// * `Err(SessionError)` - 池已停止、索引越界或新会话启动失败
    pub async fn restart(&self, index: usize) -> Result<Arc<dyn WebSession>, SessionError> {
        let old = self.acquire(index)?;
        if let Err(e) = old.close().await {
            warn!(index, "Failed to close crashed session: {}", e);
        }

        let fresh: Arc<dyn WebSession> = Arc::from(self.factory.create(index).await?);
        *self.slots[index].write() = fresh.clone();

        counter!("session_restarts_total").increment(1);
        warn!(index, "Browser session restarted");
        Ok(fresh)
    }

    /// 关闭所有会话
    ///
    /// 单个会话关闭失败只记录日志，不影响其余会话
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for slot in &self.slots {
            let session = slot.read().clone();
            if let Err(e) = session.close().await {
                warn!(index = session.index(), "Failed to close session: {}", e);
            }
        }

        gauge!("browser_sessions_active").set(0.0);
        info!(size = self.slots.len(), "Browser session pool stopped");
    }
}
