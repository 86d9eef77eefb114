// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 存储仓库模块
///
/// 定义面板图片持久化接口
pub mod storage_repository;
