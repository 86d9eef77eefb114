// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 批处理参数
///
/// 每次批处理调用时传入，开始处理前统一验证
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BatchParams {
    /// 作品名称，用作输出目录
    #[validate(length(min = 1, max = 255))]
    pub series_name: String,
    /// 输出JPEG质量
    #[validate(range(min = 1, max = 100))]
    pub jpeg_quality: u8,
    /// 图片最小宽度（像素），更窄的图片视为图标或广告
    #[validate(range(min = 50, max = 5000))]
    pub min_image_width: u32,
    /// 单次请求超时（秒）
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
}

impl BatchParams {
    pub fn new(series_name: impl Into<String>) -> Self {
        Self {
            series_name: series_name.into(),
            ..Self::default()
        }
    }
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            series_name: "untitled".to_string(),
            jpeg_quality: 92,
            min_image_width: 200,
            request_timeout_secs: 30,
        }
    }
}
