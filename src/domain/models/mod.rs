// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 批处理参数模型
pub mod batch;

/// 章节模型
///
/// 章节号、章节任务与处理结果
pub mod chapter;

/// 错误上下文模型
pub mod error_context;
