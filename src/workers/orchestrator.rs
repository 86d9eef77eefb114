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

use crate::config::settings::Settings;
use crate::domain::models::batch::BatchParams;
use crate::domain::models::chapter::{ChapterMap, ChapterResult, ChapterTask};
use crate::domain::sites::strategy::SiteId;
use crate::engines::session_pool::SessionPool;
use crate::engines::traits::SessionFactory;
use crate::utils::errors::{ChapterError, ScrapeError, ValidationError};
use crate::utils::validators;
use crate::workers::chapter_worker::{ChapterWorker, SessionLease};
use crate::workers::discovery;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use validator::Validate;

/// 进度回调：(已完成数量, 总数量, 刚结束的章节结果)
///
/// 回调返回的错误和 panic 都会被记录并忽略
pub type ProgressCallback<'a> =
    &'a mut (dyn FnMut(usize, usize, &ChapterResult) -> anyhow::Result<()> + Send);

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 浏览器会话数量，同时也是浏览器章节的并发上限
    pub num_sessions: usize,
    /// 相邻会话启动间隔
    pub session_start_delay: Duration,
    /// 无需浏览器的章节并发数
    pub driverless_concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            num_sessions: 3,
            session_start_delay: Duration::from_millis(800),
            driverless_concurrency: 8,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            num_sessions: settings.engine.num_sessions,
            session_start_delay: settings.engine.session_start_delay(),
            driverless_concurrency: settings.engine.driverless_concurrency,
        }
    }
}

/// 批处理编排器
///
/// 并发处理一组章节。需要浏览器的章节按升序编号轮流分配到会话索引，
/// 每个会话索引一条串行通道，因此浏览器章节的并发数恰好等于会话数；
/// 其余章节在独立的信号量下并发执行
pub struct BatchOrchestrator {
    worker: Arc<ChapterWorker>,
    factory: Arc<dyn SessionFactory>,
    config: OrchestratorConfig,
    pool: Mutex<Option<Arc<SessionPool>>>,
}

impl BatchOrchestrator {
    /// 创建编排器
    ///
    /// 会话池在第一次需要浏览器时才启动，之后在多次批处理之间复用
    ///
    /// # 参数
    ///
    /// * `worker` - 章节处理器
    /// * `factory` - 浏览器会话工厂
    /// * `config` - 编排器配置
    pub fn new(
        worker: Arc<ChapterWorker>,
        factory: Arc<dyn SessionFactory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            worker,
            factory,
            config,
            pool: Mutex::new(None),
        }
    }

    pub fn worker(&self) -> &ChapterWorker {
        &self.worker
    }

    /// 获取会话池，必要时启动
    async fn session_pool(&self) -> Result<Arc<SessionPool>, crate::utils::errors::SessionError> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            if pool.is_running() {
                return Ok(pool.clone());
            }
        }

        let pool = Arc::new(
            SessionPool::start(
                self.factory.clone(),
                self.config.num_sessions,
                self.config.session_start_delay,
            )
            .await?,
        );
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// 发现作品的全部章节
    ///
    /// 首选发现策略需要渲染时使用会话池中的第一个会话
    ///
    /// # 参数
    ///
    /// * `series_url` - 作品主页URL
    ///
    /// # 返回值
    ///
    /// 章节号到已验证绝对URL的有序映射
    pub async fn discover_series(&self, series_url: &str) -> Result<ChapterMap, ChapterError> {
        let url = validators::validate_url(series_url)?;
        let site = SiteId::from_url(&url);
        let registry = self.worker.registry();
        let timeout = self.worker.options().page_load_timeout;

        if registry.discovery_requires_session(&site) {
            let pool = self.session_pool().await?;
            let session = pool.acquire(0)?;
            Ok(discovery::discover_series(registry, Some(session.as_ref()), &url, timeout).await?)
        } else {
            Ok(discovery::discover_series(registry, None, &url, timeout).await?)
        }
    }

    /// 处理一批章节
    ///
    /// # 参数
    ///
    /// * `chapters` - 章节号到章节URL的映射
    /// * `params` - 批处理参数
    /// * `progress` - 每个章节结束后调用的进度回调
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<ChapterResult>)` - 每个输入章节恰好一个结果，按章节号升序排列
    /// * `Err(ValidationError)` - 批处理参数无效，未处理任何章节
    pub async fn run_batch(
        &self,
        chapters: &ChapterMap,
        params: &BatchParams,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<ChapterResult>, ValidationError> {
        params.validate()?;
        let params = Arc::new(params.clone());

        let tasks = ChapterTask::from_map(chapters);
        let total = tasks.len();
        let (tx, mut rx) = mpsc::unbounded_channel::<ChapterResult>();

        // 无效输入直接记为失败，不参与会话需求判断
        let mut valid_tasks = Vec::with_capacity(total);
        for task in tasks {
            match validate_task(&task) {
                Ok(()) => valid_tasks.push(task),
                Err(e) => {
                    let _ = tx.send(self.rejected(&task, &ChapterError::Validation(e)));
                }
            }
        }
        let rejected = total - valid_tasks.len();

        let (browser_tasks, driverless_tasks): (Vec<_>, Vec<_>) = valid_tasks
            .into_iter()
            .partition(|task| self.requires_session(&task.source_url));

        info!(
            total,
            rejected,
            browser = browser_tasks.len(),
            driverless = driverless_tasks.len(),
            "Starting batch"
        );

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        if !browser_tasks.is_empty() {
            match self.session_pool().await {
                Ok(pool) => {
                    handles.extend(self.spawn_lanes(pool, browser_tasks, params.clone(), &tx));
                }
                Err(e) => {
                    error!("Browser session pool unavailable: {}", e);
                    let err = ChapterError::Session(e);
                    for task in browser_tasks {
                        let _ = tx.send(self.rejected(&task, &err));
                    }
                }
            }
        }

        handles.extend(self.spawn_driverless(driverless_tasks, params.clone(), &tx));
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            let completed = results.len() + 1;
            if let Some(callback) = progress.as_mut() {
                match std::panic::catch_unwind(AssertUnwindSafe(|| callback(completed, total, &result))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(completed, total, "Progress callback failed: {}", e),
                    Err(_) => warn!(completed, total, "Progress callback panicked"),
                }
            }
            results.push(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Chapter lane terminated abnormally: {}", e);
            }
        }

        results.sort_by(|a, b| a.chapter.cmp(&b.chapter));
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(total, succeeded, failed = total - succeeded, "Batch finished");
        Ok(results)
    }

    /// 关闭会话池
    pub async fn shutdown(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.stop().await;
        }
    }

    /// 未进入流水线的章节，直接记为失败
    fn rejected(&self, task: &ChapterTask, err: &ChapterError) -> ChapterResult {
        let mut result = ChapterResult::pending(task.chapter, &task.source_url);
        self.worker.metrics().start_chapter(task.chapter, &task.source_url);
        self.worker.fail(&mut result, err);
        result
    }

    fn requires_session(&self, url: &str) -> bool {
        SiteId::parse(url).is_some_and(|site| self.worker.registry().scrape_requires_session(&site))
    }

    /// 每个会话索引一条串行通道
    fn spawn_lanes(
        &self,
        pool: Arc<SessionPool>,
        tasks: Vec<ChapterTask>,
        params: Arc<BatchParams>,
        tx: &mpsc::UnboundedSender<ChapterResult>,
    ) -> Vec<JoinHandle<()>> {
        let size = pool.size();
        let mut lanes: Vec<Vec<ChapterTask>> = (0..size).map(|_| Vec::new()).collect();
        for (position, task) in tasks.into_iter().enumerate() {
            lanes[position % size].push(task);
        }

        lanes
            .into_iter()
            .enumerate()
            .filter(|(_, lane)| !lane.is_empty())
            .map(|(index, lane)| {
                let worker = self.worker.clone();
                let pool = pool.clone();
                let params = params.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    for task in lane {
                        let lease = SessionLease { pool: &pool, index };
                        let result = run_isolated(&worker, task, &params, Some(lease)).await;
                        let _ = tx.send(result);
                    }
                })
            })
            .collect()
    }

    /// 无需浏览器的章节，受独立的并发上限约束
    fn spawn_driverless(
        &self,
        tasks: Vec<ChapterTask>,
        params: Arc<BatchParams>,
        tx: &mpsc::UnboundedSender<ChapterResult>,
    ) -> Vec<JoinHandle<()>> {
        let limit = Arc::new(Semaphore::new(self.config.driverless_concurrency.max(1)));
        tasks
            .into_iter()
            .map(|task| {
                let worker = self.worker.clone();
                let params = params.clone();
                let limit = limit.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = limit.acquire_owned().await.ok();
                    let result = run_isolated(&worker, task, &params, None).await;
                    let _ = tx.send(result);
                })
            })
            .collect()
    }
}

fn validate_task(task: &ChapterTask) -> Result<(), ValidationError> {
    validators::validate_chapter_number(task.chapter)?;
    validators::validate_url(&task.source_url)?;
    Ok(())
}

/// 执行单个章节，panic 也转换为失败结果
async fn run_isolated(
    worker: &ChapterWorker,
    task: ChapterTask,
    params: &BatchParams,
    lease: Option<SessionLease<'_>>,
) -> ChapterResult {
    let chapter = task.chapter;
    let url = task.source_url.clone();
    match AssertUnwindSafe(worker.process(task, params, lease))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => {
            let mut result = ChapterResult::pending(chapter, url);
            let err = ChapterError::Scrape(ScrapeError::Parse {
                what: "chapter pipeline",
                message: "worker panicked".to_string(),
            });
            worker.fail(&mut result, &err);
            result
        }
    }
}
