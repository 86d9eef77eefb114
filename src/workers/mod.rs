// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 单章节处理流水线、章节发现以及跨会话的批处理编排
pub mod chapter_worker;
pub mod discovery;
pub mod orchestrator;

pub use chapter_worker::{ChapterWorker, SessionLease, WorkerOptions};
pub use orchestrator::{BatchOrchestrator, OrchestratorConfig, ProgressCallback};
