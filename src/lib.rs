// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含章节模型、存储接口和站点策略接口
pub mod domain;

/// 引擎模块
///
/// 实现浏览器会话、会话池、弹性下载和错误分类
pub mod engines;

/// 基础设施模块
///
/// 提供站点策略、存储、清理服务和指标收集的具体实现
pub mod infrastructure;

/// 分镜切割模块
pub mod segmentation;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 实现章节处理和批处理编排
pub mod workers;
