//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（DownloadRequest / FetchPlan / DownloadOutcome 等）
//! - `trim`：裁剪时间表达式
//! - `plan`：URL 规范化、文件名与抓取计划
//! - `error`：下载错误分类
//! - `downloader`：下载主流程编排

pub mod downloader;
pub mod error;
pub mod models;
pub mod plan;
pub mod trim;

pub use downloader::Downloader;
pub use error::DownloadError;
pub use models::{DownloadOutcome, DownloadRequest};
pub use plan::PipelineSettings;
