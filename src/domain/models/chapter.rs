// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// 章节号
///
/// 可能为小数（如 12.5），作为有序且唯一的章节键使用
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    pub fn new(value: f64) -> Self {
        // -0.0 与 0.0 视为同一章节
        if value == 0.0 {
            Self(0.0)
        } else {
            Self(value)
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// 用作输出目录名的章节标识，`12.5` -> `12_5`
    pub fn path_id(&self) -> String {
        self.to_string().replace('.', "_")
    }
}

impl From<f64> for ChapterNumber {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<ChapterNumber> for f64 {
    fn from(number: ChapterNumber) -> Self {
        number.0
    }
}

impl FromStr for ChapterNumber {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<f64>().map(Self::new)
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// 章节号到章节URL的有序映射
pub type ChapterMap = BTreeMap<ChapterNumber, String>;

/// 章节任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Running => "running",
            ChapterStatus::Succeeded => "succeeded",
            ChapterStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// 章节任务
///
/// 由调用方根据章节映射创建，编排器只消费一次
#[derive(Debug, Clone)]
pub struct ChapterTask {
    /// 章节号
    pub chapter: ChapterNumber,
    /// 章节URL（在任务开始时验证）
    pub source_url: String,
    /// 任务状态
    pub status: ChapterStatus,
}

impl ChapterTask {
    pub fn new(chapter: ChapterNumber, source_url: impl Into<String>) -> Self {
        Self {
            chapter,
            source_url: source_url.into(),
            status: ChapterStatus::Pending,
        }
    }

    /// 从章节映射构建按章节号升序排列的任务列表
    pub fn from_map(map: &ChapterMap) -> Vec<Self> {
        map.iter()
            .map(|(chapter, url)| Self::new(*chapter, url.clone()))
            .collect()
    }
}

/// 章节处理结果
///
/// 无论成功与否都包含计数和可选的错误描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterResult {
    /// 章节号
    pub chapter: ChapterNumber,
    /// 章节URL
    pub url: String,
    /// 最终状态
    pub status: ChapterStatus,
    /// 发现的图片数量
    pub found_count: usize,
    /// 成功下载的图片数量
    pub downloaded_count: usize,
    /// 保存的面板数量
    pub panels_saved: usize,
    /// 面向用户的错误描述，成功时为 None
    pub error: Option<String>,
    /// 成功产出图片列表的抓取策略
    pub strategy: Option<String>,
    /// 是否在未获得下载槽位的降级模式下运行过
    pub degraded: bool,
    /// 处理耗时（毫秒）
    pub duration_ms: u64,
}

impl ChapterResult {
    /// 创建尚未开始的结果记录
    pub fn pending(chapter: ChapterNumber, url: impl Into<String>) -> Self {
        Self {
            chapter,
            url: url.into(),
            status: ChapterStatus::Pending,
            found_count: 0,
            downloaded_count: 0,
            panels_saved: 0,
            error: None,
            strategy: None,
            degraded: false,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChapterStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_number_ordering_and_identity() {
        let mut map = ChapterMap::new();
        map.insert(ChapterNumber::new(10.0), "c".into());
        map.insert(ChapterNumber::new(2.5), "b".into());
        map.insert(ChapterNumber::new(-0.0), "a".into());
        map.insert(ChapterNumber::new(0.0), "a2".into());

        let keys: Vec<f64> = map.keys().map(|c| c.value()).collect();
        assert_eq!(keys, vec![0.0, 2.5, 10.0]);
        assert_eq!(map.get(&ChapterNumber::new(0.0)).map(String::as_str), Some("a2"));
    }

    #[test]
    fn test_deserialized_negative_zero_is_chapter_zero() {
        let number: ChapterNumber = serde_json::from_str("-0.0").unwrap();
        assert!(number.value().is_sign_positive());
        assert_eq!(number, ChapterNumber::new(0.0));
        assert_eq!(number.path_id(), "0");

        let map: std::collections::BTreeMap<String, ChapterNumber> =
            serde_json::from_str(r#"{"a": -0.0, "b": 12.5}"#).unwrap();
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"a":0.0,"b":12.5}"#);
    }

    #[test]
    fn test_chapter_path_id() {
        assert_eq!(ChapterNumber::new(12.0).path_id(), "12");
        assert_eq!(ChapterNumber::new(12.5).path_id(), "12_5");
        assert_eq!("7.25".parse::<ChapterNumber>().unwrap().path_id(), "7_25");
    }

    #[test]
    fn test_tasks_from_map_are_sorted() {
        let mut map = ChapterMap::new();
        map.insert(ChapterNumber::new(3.0), "http://site/ch3".into());
        map.insert(ChapterNumber::new(1.0), "http://site/ch1".into());

        let tasks = ChapterTask::from_map(&map);
        assert_eq!(tasks[0].chapter, ChapterNumber::new(1.0));
        assert_eq!(tasks[1].source_url, "http://site/ch3");
        assert!(tasks.iter().all(|t| t.status == ChapterStatus::Pending));
    }
}
