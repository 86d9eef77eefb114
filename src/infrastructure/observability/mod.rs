// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 可观测性模块
///
/// 提供章节级指标收集与 Prometheus 指标导出
pub mod collector;
pub mod metrics;
