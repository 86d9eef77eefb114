// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 提供领域接口的具体实现以及与外部系统的交互：
/// - 清理服务（cleaner）：外部图片清理服务的 HTTP 客户端
/// - 可观测性（observability）：章节指标收集与 Prometheus 导出
/// - 站点策略（sites）：具体站点的发现与抓取策略及其注册表
/// - 存储（storage）：分镜文件的本地与内存存储
pub mod cleaner;
pub mod observability;
pub mod sites;
pub mod storage;
