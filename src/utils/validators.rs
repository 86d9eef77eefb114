// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::chapter::ChapterNumber;
use crate::utils::errors::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// URL最大长度
pub const MAX_URL_LENGTH: usize = 2048;
/// 章节号上限
pub const MAX_CHAPTER_NUMBER: f64 = 10_000.0;
/// 文件名最大长度
pub const MAX_FILENAME_LENGTH: usize = 255;

const DANGEROUS_PATTERNS: [&str; 10] = ["..", "~", "$", ";", "|", "&", "`", "\n", "\r", "\0"];

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.\s]").expect("Invalid filename regex"));

/// 验证URL
///
/// # 参数
///
/// * `url` - URL字符串
///
/// # 返回值
///
/// * `Ok(Url)` - 解析后的URL
/// * `Err(ValidationError)` - 为空、过长、协议不是 http/https 或缺少主机名
pub fn validate_url(url: &str) -> Result<Url, ValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(ValidationError::UrlTooLong {
            max: MAX_URL_LENGTH,
        });
    }

    let parsed = Url::parse(url).map_err(|_| ValidationError::InvalidUrl(url.to_string()))?;

    // Check scheme
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(ValidationError::MissingHost),
    }
}

/// 验证章节号，必须是 0..=10000 内的有限数
pub fn validate_chapter_number(chapter: ChapterNumber) -> Result<ChapterNumber, ValidationError> {
    let value = chapter.value();
    if !value.is_finite() || !(0.0..=MAX_CHAPTER_NUMBER).contains(&value) {
        return Err(ValidationError::ChapterOutOfRange(value));
    }
    Ok(chapter)
}

/// 验证整数参数范围
pub fn validate_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<i64, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

/// 验证文件名或路径片段
///
/// 拒绝路径穿越和 shell 元字符，其余非法字符替换为下划线
pub fn sanitize_filename(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() || name.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::UnsafeFileName(name.to_string()));
    }
    if DANGEROUS_PATTERNS.iter().any(|p| name.contains(p)) {
        return Err(ValidationError::UnsafeFileName(name.to_string()));
    }
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name, "_").trim().to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(ValidationError::UnsafeFileName(name.to_string()));
    }
    Ok(cleaned)
}

/// 作品名转换为安全的目录名
///
/// 只保留字母数字、空格、`-` 和 `_`，空格替换为 `_`
pub fn safe_series_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let kept = kept.trim().replace(' ', "_");
    if kept.is_empty() {
        "untitled".to_string()
    } else {
        kept.chars().take(MAX_FILENAME_LENGTH).collect()
    }
}
