// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 长条漫画的分镜切割
//!
//! 仅依据像素统计决定是否切割以及在哪里切割，
//! 输出一个或多个裁掉留白的分镜图片，结果永不为空

/// 切割阈值
pub mod config;
/// 内容密度判断
pub mod content;
/// 行统计与间隔检测
pub mod profile;
/// 留白裁剪
pub mod trim;

pub use config::SegmentationConfig;

use crate::utils::errors::SegmentationError;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tracing::{debug, info};

/// 矩形区域，坐标基于原图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PanelBounds {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 覆盖整张图的区域
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 切割出的分镜
#[derive(Debug, Clone)]
pub struct PanelImage {
    /// 裁剪后的像素
    pub image: DynamicImage,
    /// 在原图中的位置
    pub bounds: PanelBounds,
}

impl PanelImage {
    pub fn width(&self) -> u32 {
        self.bounds.width
    }

    pub fn height(&self) -> u32 {
        self.bounds.height
    }

    /// 编码为 JPEG
    ///
    /// # 参数
    ///
    /// * `quality` - JPEG 质量，1..=100
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, SegmentationError> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        self.image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(SegmentationError::Encode)?;
        Ok(buffer)
    }
}

/// 分镜切割器
#[derive(Debug, Clone, Default)]
pub struct PanelSegmenter {
    config: SegmentationConfig,
}

impl PanelSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// 解码并切割图片
    ///
    /// # 参数
    ///
    /// * `bytes` - 原始图片字节
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<PanelImage>)` - 至少包含一个分镜
    /// * `Err(SegmentationError)` - 图片无法解码
    pub fn segment(&self, bytes: &[u8]) -> Result<Vec<PanelImage>, SegmentationError> {
        let image = image::load_from_memory(bytes).map_err(SegmentationError::Decode)?;
        Ok(self.segment_image(&image))
    }

    /// 在阻塞线程池中切割并编码为 JPEG，避免占用异步运行时
    ///
    /// # 参数
    ///
    /// * `bytes` - 原始图片字节
    /// * `quality` - JPEG 质量
    ///
    /// # 返回值
    ///
    /// 按从上到下顺序排列的分镜 JPEG
    pub async fn segment_to_jpeg(
        &self,
        bytes: Bytes,
        quality: u8,
    ) -> Result<Vec<Vec<u8>>, SegmentationError> {
        let segmenter = self.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<u8>>, SegmentationError> {
            segmenter
                .segment(&bytes)?
                .iter()
                .map(|panel| panel.encode_jpeg(quality))
                .collect()
        })
        .await
        .map_err(|e| SegmentationError::Worker(e.to_string()))?
    }

    /// 切割已解码的图片
    ///
    /// 找不到有效切割点或所有切片都被过滤时，返回裁边后的整张图
    pub fn segment_image(&self, image: &DynamicImage) -> Vec<PanelImage> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        let whole = PanelBounds::full(width, height);
        if whole.is_empty() {
            return vec![crop(image, whole)];
        }

        let profile = profile::RowProfile::from_gray(&gray);
        let cuts = if profile::worth_slicing(&gray, &profile, &self.config) {
            profile::find_cut_points(&gray, &profile, &self.config)
        } else {
            Vec::new()
        };

        if cuts.is_empty() {
            debug!(width, height, "No cut points, keeping whole image");
            return vec![self.trimmed(image, &gray, whole)];
        }

        let mut edges = Vec::with_capacity(cuts.len() + 2);
        edges.push(0);
        edges.extend(cuts.iter().copied());
        edges.push(height);

        let panels: Vec<PanelImage> = edges
            .windows(2)
            .filter_map(|pair| {
                let slice = PanelBounds::new(0, pair[0], width, pair[1] - pair[0]);
                if slice.height < self.config.min_panel_height {
                    debug!(y = slice.y, height = slice.height, "Slice too short, dropped");
                    return None;
                }
                if !content::has_sufficient_content(&gray, slice, &self.config) {
                    debug!(y = slice.y, height = slice.height, "Slice lacks content, dropped");
                    return None;
                }
                Some(self.trimmed(image, &gray, slice))
            })
            .collect();

        if panels.is_empty() {
            return vec![self.trimmed(image, &gray, whole)];
        }

        info!(
            width,
            height,
            cuts = cuts.len(),
            panels = panels.len(),
            "Image segmented"
        );
        panels
    }

    fn trimmed(&self, image: &DynamicImage, gray: &GrayImage, area: PanelBounds) -> PanelImage {
        crop(image, trim::trim_bounds(gray, area, &self.config))
    }
}

fn crop(image: &DynamicImage, bounds: PanelBounds) -> PanelImage {
    PanelImage {
        image: image.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height),
        bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma};
    use std::io::Cursor;

    /// 高对比度的棋盘格内容，灰度值均低于内容阈值
    fn content_pixel(x: u32, y: u32) -> u8 {
        if (x / 8 + y / 8) % 2 == 0 {
            20
        } else {
            220
        }
    }

    fn strip(width: u32, height: u32, bands: &[(u32, u32)]) -> DynamicImage {
        let gray = GrayImage::from_fn(width, height, |x, y| {
            if bands.iter().any(|&(start, end)| (start..end).contains(&y)) {
                Luma([255])
            } else {
                Luma([content_pixel(x, y)])
            }
        });
        DynamicImage::ImageLuma8(gray)
    }

    #[test]
    fn test_two_white_bands_give_three_panels() {
        let segmenter = PanelSegmenter::default();
        let image = strip(1600, 6000, &[(2000, 2080), (4000, 4080)]);

        let gray = image.to_luma8();
        let profile = profile::RowProfile::from_gray(&gray);
        assert!(profile::worth_slicing(&gray, &profile, segmenter.config()));
        assert_eq!(
            profile::find_cut_points(&gray, &profile, segmenter.config()),
            vec![2040, 4040]
        );

        let panels = segmenter.segment_image(&image);
        assert_eq!(panels.len(), 3);
        assert_eq!(panels[0].bounds, PanelBounds::new(0, 0, 1600, 2005));
        assert_eq!(panels[1].bounds, PanelBounds::new(0, 2075, 1600, 1930));
        assert_eq!(panels[2].bounds, PanelBounds::new(0, 4075, 1600, 1925));

        let total: u32 = panels.iter().map(PanelImage::height).sum();
        assert!(total <= 6000);
        for panel in &panels {
            assert_eq!(panel.image.height(), panel.height());
        }
    }

    #[test]
    fn test_low_aspect_ratio_is_kept_whole() {
        let segmenter = PanelSegmenter::default();
        let image = strip(1600, 4000, &[(1300, 1380), (2600, 2680)]);
        let panels = segmenter.segment_image(&image);
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].bounds, PanelBounds::full(1600, 4000));
    }

    #[test]
    fn test_single_band_is_not_enough_to_slice() {
        let segmenter = PanelSegmenter::default();
        let image = strip(800, 4000, &[(2000, 2080)]);
        assert_eq!(segmenter.segment_image(&image).len(), 1);
    }

    #[test]
    fn test_blank_image_still_yields_a_panel() {
        let segmenter = PanelSegmenter::default();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 1000, Luma([255])));
        let panels = segmenter.segment_image(&image);
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].bounds, PanelBounds::full(200, 1000));
    }

    #[test]
    fn test_short_slices_fall_back_to_whole_image() {
        let config = SegmentationConfig {
            min_panel_height: 5000,
            ..SegmentationConfig::default()
        };
        let segmenter = PanelSegmenter::new(config);
        let image = strip(1600, 6000, &[(2000, 2080), (4000, 4080)]);
        let panels = segmenter.segment_image(&image);
        assert_eq!(panels.len(), 1);
        assert!(panels[0].height() <= 6000);
    }

    #[test]
    fn test_segment_decodes_and_encodes() {
        let segmenter = PanelSegmenter::default();
        let mut png = Vec::new();
        strip(300, 400, &[])
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let panels = segmenter.segment(&png).unwrap();
        assert_eq!(panels.len(), 1);
        let jpeg = panels[0].encode_jpeg(92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_undecodable_bytes_are_an_error() {
        let segmenter = PanelSegmenter::default();
        let err = segmenter.segment(b"definitely not an image").unwrap_err();
        assert!(matches!(err, SegmentationError::Decode(_)));
    }

    #[tokio::test]
    async fn test_segment_to_jpeg() {
        let segmenter = PanelSegmenter::default();
        let mut png = Vec::new();
        strip(1600, 6000, &[(2000, 2080), (4000, 4080)])
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let panels = segmenter.segment_to_jpeg(Bytes::from(png), 80).await.unwrap();
        assert_eq!(panels.len(), 3);
        assert!(panels.iter().all(|jpeg| jpeg.starts_with(&[0xFF, 0xD8])));

        let err = segmenter
            .segment_to_jpeg(Bytes::from_static(b"garbage"), 80)
            .await
            .unwrap_err();
        assert!(matches!(err, SegmentationError::Decode(_)));
    }
}
