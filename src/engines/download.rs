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

use crate::engines::traits::{FetchRequest, FetchedImage, ImageFetcher};
use crate::utils::errors::FetchError;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// 全局下载槽位
///
/// 所有章节共享的下载并发上限。每个进行中的下载持有一个槽位，
/// 因此任意时刻进行中的下载数不超过容量。
///
/// 等待槽位超过 `wait` 时下载仍会继续但不受限流（降级模式），
/// 该情况会记录日志、计数并反映在章节结果中。
#[derive(Clone, Debug)]
pub struct DownloadSlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    wait: Duration,
}

/// 下载槽位守卫，离开作用域时释放槽位
#[derive(Debug)]
pub struct SlotGuard {
    permit: Option<OwnedSemaphorePermit>,
    semaphore: Arc<Semaphore>,
}

impl SlotGuard {
    /// 是否在未取得槽位的情况下继续
    pub fn is_degraded(&self) -> bool {
        self.permit.is_none()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            gauge!("download_slots_available").set(self.semaphore.available_permits() as f64);
        }
    }
}

impl DownloadSlots {
    /// 创建下载槽位
    ///
    /// # 参数
    ///
    /// * `capacity` - 槽位数量，至少为1
    /// * `wait` - 获取槽位的最长等待时间
    pub fn new(capacity: usize, wait: Duration) -> Self {
        let capacity = capacity.max(1);
        gauge!("download_slots_available").set(capacity as f64);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            wait,
        }
    }

    /// 按会话池大小和每章节下载线程数计算容量
    pub fn for_pool(pool_size: usize, workers_per_chapter: usize, wait: Duration) -> Self {
        Self::new(pool_size.max(1) * workers_per_chapter.max(1), wait)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前空闲槽位数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 获取一个槽位
    ///
    /// 最多等待配置的时长；超时后返回降级守卫而不是失败
    pub async fn acquire(&self) -> SlotGuard {
        let permit = match tokio::time::timeout(self.wait, self.semaphore.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => Some(permit),
            Ok(Err(_)) => {
                warn!("Download slot semaphore closed, continuing without a slot");
                None
            }
            Err(_) => {
                warn!(
                    wait = ?self.wait,
                    capacity = self.capacity,
                    "Timed out waiting for a download slot, continuing unthrottled"
                );
                counter!("download_slot_timeouts_total").increment(1);
                None
            }
        };

        if permit.is_some() {
            gauge!("download_slots_available").set(self.semaphore.available_permits() as f64);
        }

        SlotGuard {
            permit,
            semaphore: self.semaphore.clone(),
        }
    }
}

/// 批量图片下载
///
/// 在单个下载器之上提供有界并发的批量下载：
/// `fetch_all` 保持输入顺序并丢弃失败项，
/// `fetch_stream` 按完成顺序逐个产出结果
#[derive(Clone)]
pub struct DownloadBatch {
    fetcher: Arc<dyn ImageFetcher>,
    slots: Option<DownloadSlots>,
    workers: usize,
    degraded: Arc<AtomicUsize>,
}

impl DownloadBatch {
    /// 创建批量下载器
    ///
    /// # 参数
    ///
    /// * `fetcher` - 单张图片下载器
    /// * `workers` - 本批次的并发下载数
    pub fn new(fetcher: Arc<dyn ImageFetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            slots: None,
            workers: workers.max(1),
            degraded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 使用全局下载槽位限制并发
    pub fn with_slots(mut self, slots: DownloadSlots) -> Self {
        self.slots = Some(slots);
        self
    }

    /// 未取得槽位而降级执行的下载数
    pub fn degraded_count(&self) -> usize {
        self.degraded.load(Ordering::Relaxed)
    }

    /// 下载全部图片并保持输入顺序
    ///
    /// 失败的图片被丢弃，返回数量少于请求数量时由调用方提示
    pub async fn fetch_all(&self, requests: Vec<FetchRequest>) -> Vec<FetchedImage> {
        let total = requests.len();
        let images: Vec<FetchedImage> = self
            .stream_with(requests)
            .buffered(self.workers)
            .filter_map(|result| async move { result.ok() })
            .collect()
            .await;

        if images.len() < total {
            warn!(
                requested = total,
                downloaded = images.len(),
                "Some images failed to download"
            );
        }
        images
    }

    /// 流式下载
    ///
    /// 结果按完成顺序产出，下游可以在全部下载结束前开始处理
    pub fn fetch_stream(
        &self,
        requests: Vec<FetchRequest>,
    ) -> BoxStream<'static, Result<FetchedImage, FetchError>> {
        self.stream_with(requests)
            .buffer_unordered(self.workers)
            .boxed()
    }

    /// 在后台任务中驱动流式下载
    ///
    /// 下游逐个处理结果时其余下载仍在进行；接收端被丢弃后后台任务随即停止
    pub fn spawn_stream(
        &self,
        requests: Vec<FetchRequest>,
    ) -> mpsc::UnboundedReceiver<Result<FetchedImage, FetchError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut results = self.fetch_stream(requests);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = results.next() => match next {
                        Some(result) => {
                            if tx.send(result).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        rx
    }

    fn stream_with(
        &self,
        requests: Vec<FetchRequest>,
    ) -> BoxStream<'static, BoxFuture<'static, Result<FetchedImage, FetchError>>> {
        let fetcher = self.fetcher.clone();
        let slots = self.slots.clone();
        let degraded = self.degraded.clone();
        stream::iter(requests)
            .map(move |request| {
                fetch_one(fetcher.clone(), slots.clone(), degraded.clone(), request).boxed()
            })
            .boxed()
    }
}

async fn fetch_one(
    fetcher: Arc<dyn ImageFetcher>,
    slots: Option<DownloadSlots>,
    degraded: Arc<AtomicUsize>,
    request: FetchRequest,
) -> Result<FetchedImage, FetchError> {
    let guard = match &slots {
        Some(slots) => Some(slots.acquire().await),
        None => None,
    };
    if guard.as_ref().is_some_and(SlotGuard::is_degraded) {
        degraded.fetch_add(1, Ordering::Relaxed);
    }

    let result = fetcher.fetch(&request).await;
    drop(guard);
    result
}
