// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务模型与接口，包括：
/// - 领域模型（models）：章节任务、结果、错误上下文和批处理参数
/// - 仓库接口（repositories）：面板持久化抽象接口
/// - 站点策略（sites）：章节发现与图片抓取的策略接口
pub mod models;
pub mod repositories;
pub mod sites;
