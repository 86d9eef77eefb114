// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::config::SegmentationConfig;
use super::content::content_ratio;
use super::PanelBounds;
use image::GrayImage;
use tracing::debug;

/// 每行灰度的均值和标准差
#[derive(Debug, Clone)]
pub struct RowProfile {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl RowProfile {
    /// 计算灰度图每行的统计量（总体标准差）
    pub fn from_gray(gray: &GrayImage) -> Self {
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        let mut means = Vec::with_capacity(height);
        let mut stds = Vec::with_capacity(height);
        if width == 0 {
            return Self { means, stds };
        }

        for row in gray.as_raw().chunks_exact(width) {
            let n = width as f64;
            let sum: f64 = row.iter().map(|&p| p as f64).sum();
            let mean = sum / n;
            let var = row
                .iter()
                .map(|&p| {
                    let d = p as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            means.push(mean);
            stds.push(var.sqrt());
        }
        Self { means, stds }
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }
}

/// 间隔区，行范围 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapZone {
    pub start: u32,
    pub end: u32,
}

impl GapZone {
    pub fn height(&self) -> u32 {
        self.end - self.start
    }

    /// 切割点：间隔区的垂直中点
    pub fn midpoint(&self) -> u32 {
        self.start + self.height() / 2
    }
}

/// 线性插值百分位，`p` 取 0..=100
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// 标记候选间隔行：行内几乎单色，且接近白色或接近黑色
pub fn candidate_rows(profile: &RowProfile, config: &SegmentationConfig) -> Vec<bool> {
    let bright = percentile(&profile.means, config.bright_percentile).max(config.bright_floor);
    profile
        .means
        .iter()
        .zip(&profile.stds)
        .map(|(&mean, &std)| {
            std < config.gap_std_threshold && (mean >= bright || mean < config.dark_threshold)
        })
        .collect()
}

/// 连续的标记行组成区间
///
/// 只有被非标记行结束的区间才计入，延伸到图片底部的区间不算
pub fn runs(flags: &[bool], min_height: u32) -> Vec<GapZone> {
    let mut zones = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &flag) in flags.iter().enumerate() {
        match (flag, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if (i - s) as u32 >= min_height {
                    zones.push(GapZone {
                        start: s as u32,
                        end: i as u32,
                    });
                }
                start = None;
            }
            _ => {}
        }
    }
    zones
}

/// 是否值得尝试切割
///
/// 高宽比达到阈值，且存在足够多的高亮间隔
pub fn worth_slicing(gray: &GrayImage, profile: &RowProfile, config: &SegmentationConfig) -> bool {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return false;
    }
    let ratio = height as f64 / width as f64;
    if ratio < config.min_aspect_ratio {
        debug!(ratio, "Image kept whole, aspect ratio below threshold");
        return false;
    }

    let bright: Vec<bool> = profile
        .means
        .iter()
        .map(|&m| m > config.precheck_bright_mean)
        .collect();
    let gaps = runs(&bright, config.min_gap_height).len();
    debug!(ratio, gaps, "Slicing pre-check");
    gaps >= config.min_slice_gaps
}

/// 间隔区是否为干净的水平带
///
/// 列均值的波动要小（排除竖向装饰元素），且区内绝大部分行都是候选行
pub fn is_clean_band(
    gray: &GrayImage,
    zone: GapZone,
    candidates: &[bool],
    config: &SegmentationConfig,
) -> bool {
    let width = gray.width() as usize;
    let height = zone.height();
    if width == 0 || height == 0 {
        return false;
    }

    let mut column_sums = vec![0f64; width];
    let raw = gray.as_raw();
    for y in zone.start..zone.end {
        let row = &raw[y as usize * width..(y as usize + 1) * width];
        for (sum, &p) in column_sums.iter_mut().zip(row) {
            *sum += p as f64;
        }
    }
    let column_means: Vec<f64> = column_sums.iter().map(|s| s / height as f64).collect();
    let mean = column_means.iter().sum::<f64>() / width as f64;
    let spread = (column_means
        .iter()
        .map(|c| (c - mean) * (c - mean))
        .sum::<f64>()
        / width as f64)
        .sqrt();
    if spread >= config.max_column_std {
        debug!(start = zone.start, spread, "Gap rejected, uneven columns");
        return false;
    }

    let uniform = candidates[zone.start as usize..zone.end as usize]
        .iter()
        .filter(|&&c| c)
        .count();
    let consistency = uniform as f64 / height as f64;
    consistency >= config.gap_consistency
}

/// 间隔上下方是否都有足够内容
///
/// 避免把开头或结尾的空白边距当成场景分隔；窗口为空时不通过
pub fn has_context(gray: &GrayImage, zone: GapZone, config: &SegmentationConfig) -> bool {
    let (width, height) = gray.dimensions();
    let above_start = zone.start.saturating_sub(config.context_window);
    let below_end = zone.end.saturating_add(config.context_window).min(height);

    let above = PanelBounds::new(0, above_start, width, zone.start - above_start);
    let below = PanelBounds::new(0, zone.end, width, below_end.saturating_sub(zone.end));
    if above.is_empty() || below.is_empty() {
        return false;
    }

    let before = content_ratio(gray, above, config.content_threshold);
    let after = content_ratio(gray, below, config.content_threshold);
    before > config.context_min_ratio && after > config.context_min_ratio
}

/// 计算所有切割点
pub fn find_cut_points(
    gray: &GrayImage,
    profile: &RowProfile,
    config: &SegmentationConfig,
) -> Vec<u32> {
    let candidates = candidate_rows(profile, config);
    let zones = runs(&candidates, config.min_gap_height);
    debug!(candidates = zones.len(), "Gap zones detected");

    zones
        .into_iter()
        .filter(|zone| is_clean_band(gray, *zone, &candidates, config))
        .filter(|zone| has_context(gray, *zone, config))
        .map(|zone| zone.midpoint())
        .collect()
}
