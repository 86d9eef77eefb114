// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::config::SegmentationConfig;
use super::PanelBounds;
use image::GrayImage;

/// 统计区域内满足条件的像素数
pub(crate) fn count_pixels(gray: &GrayImage, area: PanelBounds, pred: impl Fn(u8) -> bool) -> usize {
    let stride = gray.width() as usize;
    let raw = gray.as_raw();
    let mut count = 0;
    for y in area.y..area.bottom() {
        let start = y as usize * stride + area.x as usize;
        count += raw[start..start + area.width as usize]
            .iter()
            .filter(|&&p| pred(p))
            .count();
    }
    count
}

/// 内容比例：灰度低于阈值的像素占比，空区域为 0
pub fn content_ratio(gray: &GrayImage, area: PanelBounds, threshold: u8) -> f64 {
    if area.is_empty() {
        return 0.0;
    }
    let content = count_pixels(gray, area, |p| p < threshold);
    content as f64 / area.area() as f64
}

/// 九宫格中内容比例超过阈值的区域数
pub fn active_zones(gray: &GrayImage, area: PanelBounds, config: &SegmentationConfig) -> usize {
    let mut active = 0;
    for row in 0..3u32 {
        for col in 0..3u32 {
            let top = area.y + row * area.height / 3;
            let bottom = area.y + (row + 1) * area.height / 3;
            let left = area.x + col * area.width / 3;
            let right = area.x + (col + 1) * area.width / 3;
            let zone = PanelBounds::new(left, top, right - left, bottom - top);
            if content_ratio(gray, zone, config.content_threshold) > config.zone_min_ratio {
                active += 1;
            }
        }
    }
    active
}

/// 切片是否有足够内容
///
/// 整体内容比例达到下限，且九宫格中至少有指定数量的活跃区域
pub fn has_sufficient_content(
    gray: &GrayImage,
    area: PanelBounds,
    config: &SegmentationConfig,
) -> bool {
    if content_ratio(gray, area, config.content_threshold) < config.min_content_ratio {
        return false;
    }
    active_zones(gray, area, config) >= config.min_active_zones
}
