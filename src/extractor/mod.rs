//! 外部抽取/抓取工具的抽象。
//!
//! 编排器只依赖 [`MediaExtractor`]；生产实现是调用 yt-dlp 子进程的 [`ytdlp::YtDlp`]，
//! 测试中用内存实现替换。

pub mod formats;
pub mod ytdlp;

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::download::models::FetchPlan;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to start {bin}: {source}")]
    Spawn {
        bin: String,
        source: std::io::Error,
    },
    #[error("extractor exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("unexpected extractor output: {0}")]
    Parse(String),
    #[error("extractor reported success but no file exists at {0}")]
    MissingOutput(PathBuf),
}

impl ExtractError {
    /// Human readable reason, preferring the tool's own last error line.
    pub fn reason(&self) -> String {
        match self {
            ExtractError::Failed { stderr, .. } => stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("extractor failed")
                .to_string(),
            other => other.to_string(),
        }
    }
}

/// Metadata the extractor reports for a single video.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    /// Final location after post-processing; only present on fetch results.
    #[serde(default)]
    pub filepath: Option<PathBuf>,
    #[serde(default, rename = "_filename")]
    pub filename: Option<PathBuf>,
}

impl VideoInfo {
    pub fn title_or_default(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("video")
            .to_string()
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

pub trait MediaExtractor: Send + Sync {
    /// Metadata and format list, without downloading anything.
    fn probe(&self, url: &str) -> Result<VideoInfo, ExtractError>;

    /// Execute the plan (single attempt) and report the resulting info,
    /// including where the finished file landed when the tool knows it.
    fn fetch(&self, plan: &FetchPlan) -> Result<VideoInfo, ExtractError>;
}
