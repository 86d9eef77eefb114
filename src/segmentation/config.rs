// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 分镜切割阈值
///
/// 所有阈值都集中在这里，数值即切割行为的约定，调整时需要对比实验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// 高宽比低于此值时不切割
    pub min_aspect_ratio: f64,
    /// 预检：行均值高于此值视为亮行
    pub precheck_bright_mean: f64,
    /// 预检：至少需要的亮色间隔数
    pub min_slice_gaps: usize,
    /// 间隔行的标准差上限
    pub gap_std_threshold: f64,
    /// 亮行判定所用的行均值百分位
    pub bright_percentile: f64,
    /// 亮行判定的最低阈值
    pub bright_floor: f64,
    /// 暗行判定阈值
    pub dark_threshold: f64,
    /// 间隔区最小高度（像素）
    pub min_gap_height: u32,
    /// 间隔区列均值标准差上限
    pub max_column_std: f64,
    /// 间隔区内候选行的最低比例
    pub gap_consistency: f64,
    /// 上下文窗口高度（像素）
    pub context_window: u32,
    /// 上下文窗口的最低内容比例
    pub context_min_ratio: f64,
    /// 灰度低于此值的像素视为内容
    pub content_threshold: u8,
    /// 分镜最小高度（像素）
    pub min_panel_height: u32,
    /// 分镜最低内容比例
    pub min_content_ratio: f64,
    /// 九宫格中单个区域的活跃阈值
    pub zone_min_ratio: f64,
    /// 最少活跃区域数
    pub min_active_zones: usize,
    /// 裁边保留的留白（像素）
    pub trim_padding: u32,
    /// 上下边缘均值低于此值视为装饰性黑框，不裁边
    pub dark_frame_mean: f64,
    /// 暗背景下高于此值的像素视为内容
    pub dark_background_threshold: u8,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_aspect_ratio: 3.5,
            precheck_bright_mean: 240.0,
            min_slice_gaps: 2,
            gap_std_threshold: 12.0,
            bright_percentile: 95.0,
            bright_floor: 235.0,
            dark_threshold: 10.0,
            min_gap_height: 50,
            max_column_std: 15.0,
            gap_consistency: 0.90,
            context_window: 100,
            context_min_ratio: 0.15,
            content_threshold: 240,
            min_panel_height: 300,
            min_content_ratio: 0.20,
            zone_min_ratio: 0.08,
            min_active_zones: 4,
            trim_padding: 5,
            dark_frame_mean: 50.0,
            dark_background_threshold: 15,
        }
    }
}
