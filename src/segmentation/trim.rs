// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::config::SegmentationConfig;
use super::PanelBounds;
use image::GrayImage;

fn row_mean(gray: &GrayImage, area: PanelBounds, y: u32) -> f64 {
    let width = gray.width() as usize;
    let start = y as usize * width + area.x as usize;
    let row = &gray.as_raw()[start..start + area.width as usize];
    row.iter().map(|&p| p as f64).sum::<f64>() / row.len() as f64
}

fn column_mean(gray: &GrayImage, area: PanelBounds, x: u32) -> f64 {
    let sum: f64 = (area.y..area.bottom()).map(|y| gray.get_pixel(x, y)[0] as f64).sum();
    sum / area.height as f64
}

/// 四条边各自求均值后再平均，长边不会压过短边
fn edge_mean(gray: &GrayImage, area: PanelBounds) -> f64 {
    let sides = [
        row_mean(gray, area, area.y),
        row_mean(gray, area, area.bottom() - 1),
        column_mean(gray, area, area.x),
        column_mean(gray, area, area.right() - 1),
    ];
    sides.iter().sum::<f64>() / sides.len() as f64
}

/// 计算裁掉背景留白后的边界
///
/// 上下边缘过暗时视为装饰性黑框，原样保留；
/// 否则按四条边的平均亮度判断背景是亮是暗，裁到内容包围盒并保留少量留白。
/// 结果总在 `area` 之内，对已经裁好的区域再次调用得到相同边界
///
/// # 参数
///
/// * `gray` - 整张图的灰度图
/// * `area` - 待裁剪区域
/// * `config` - 阈值配置
pub fn trim_bounds(gray: &GrayImage, area: PanelBounds, config: &SegmentationConfig) -> PanelBounds {
    if area.is_empty() {
        return area;
    }

    let top = row_mean(gray, area, area.y);
    let bottom = row_mean(gray, area, area.bottom() - 1);
    if top < config.dark_frame_mean || bottom < config.dark_frame_mean {
        return area;
    }

    let light_background = edge_mean(gray, area) > 127.0;
    let is_content = |p: u8| {
        if light_background {
            p < config.content_threshold
        } else {
            p > config.dark_background_threshold
        }
    };

    let width = gray.width() as usize;
    let raw = gray.as_raw();
    let mut rows: Option<(u32, u32)> = None;
    let mut cols: Option<(u32, u32)> = None;
    for y in area.y..area.bottom() {
        let start = y as usize * width + area.x as usize;
        let row = &raw[start..start + area.width as usize];
        let first = row.iter().position(|&p| is_content(p));
        let last = row.iter().rposition(|&p| is_content(p));
        if let (Some(first), Some(last)) = (first, last) {
            let (first, last) = (area.x + first as u32, area.x + last as u32);
            rows = Some(rows.map_or((y, y), |(t, _)| (t, y)));
            cols = Some(cols.map_or((first, last), |(l, r)| (l.min(first), r.max(last))));
        }
    }

    let (Some((min_y, max_y)), Some((min_x, max_x))) = (rows, cols) else {
        return area;
    };

    let pad = config.trim_padding;
    let left = min_x.saturating_sub(pad).max(area.x);
    let top = min_y.saturating_sub(pad).max(area.y);
    let right = (max_x + pad + 1).min(area.right());
    let bottom = (max_y + pad + 1).min(area.bottom());
    PanelBounds::new(left, top, right - left, bottom - top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops, Luma};

    fn framed_content() -> GrayImage {
        GrayImage::from_fn(400, 300, |x, y| {
            if (100..300).contains(&x) && (50..250).contains(&y) {
                Luma([((x + y) % 200) as u8])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_trim_to_content_with_padding() {
        let config = SegmentationConfig::default();
        let gray = framed_content();
        let bounds = trim_bounds(&gray, PanelBounds::full(400, 300), &config);
        assert_eq!(bounds, PanelBounds::new(95, 45, 210, 210));
    }

    #[test]
    fn test_trim_is_idempotent() {
        let config = SegmentationConfig::default();
        let gray = framed_content();
        let first = trim_bounds(&gray, PanelBounds::full(400, 300), &config);

        let cropped = imageops::crop_imm(&gray, first.x, first.y, first.width, first.height).to_image();
        let second = trim_bounds(&cropped, PanelBounds::full(first.width, first.height), &config);
        assert_eq!(second, PanelBounds::full(first.width, first.height));

        let again = trim_bounds(&gray, first, &config);
        assert_eq!(again, first);
    }

    #[test]
    fn test_dark_frame_is_preserved() {
        let config = SegmentationConfig::default();
        let gray = GrayImage::from_fn(200, 200, |_, y| if y < 4 || y >= 196 { Luma([0]) } else { Luma([255]) });
        let area = PanelBounds::full(200, 200);
        assert_eq!(trim_bounds(&gray, area, &config), area);
    }

    #[test]
    fn test_dark_background_trims_columns() {
        let config = SegmentationConfig::default();
        // 上下边缘只在中段有亮色，均值刚好达到黑框阈值，四边整体偏暗
        let gray = GrayImage::from_fn(300, 100, |x, y| {
            if (y == 0 || y == 99) && (100..200).contains(&x) {
                Luma([150])
            } else if (140..160).contains(&x) && (40..60).contains(&y) {
                Luma([200])
            } else {
                Luma([0])
            }
        });
        let bounds = trim_bounds(&gray, PanelBounds::full(300, 100), &config);
        assert_eq!(bounds, PanelBounds::new(95, 0, 110, 100));
    }

    #[test]
    fn test_dark_art_between_white_margins_is_trimmed() {
        let config = SegmentationConfig::default();
        let gray = GrayImage::from_fn(800, 2000, |_, y| {
            if y < 100 || y >= 1900 {
                Luma([255])
            } else {
                Luma([40])
            }
        });
        let bounds = trim_bounds(&gray, PanelBounds::full(800, 2000), &config);
        assert_eq!(bounds, PanelBounds::new(0, 95, 800, 1810));
    }

    #[test]
    fn test_blank_area_is_kept() {
        let config = SegmentationConfig::default();
        let gray = GrayImage::from_pixel(50, 50, Luma([255]));
        let area = PanelBounds::full(50, 50);
        assert_eq!(trim_bounds(&gray, area, &config), area);
    }
}
