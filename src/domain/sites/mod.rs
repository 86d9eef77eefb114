// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 站点策略领域模块
///
/// 定义章节发现与图片抓取的可插拔策略接口，
/// 以及从URL解析出的规范化站点标识
pub mod strategy;
