//! 格式列表解析：把抽取结果整理成 `/api/video-info` 的返回结构。

use serde::Serialize;

use super::{RawFormat, VideoInfo};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormatSummary {
    Video {
        format_id: String,
        resolution: String,
        fps: Option<f64>,
        extension: Option<String>,
        filesize: Option<u64>,
    },
    Audio {
        format_id: String,
        bitrate: f64,
        extension: Option<String>,
        filesize: Option<u64>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoSummary {
    pub title: String,
    pub author: Option<String>,
    pub duration: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    pub source_id: Option<String>,
    pub formats: Vec<FormatSummary>,
}

impl InfoSummary {
    pub fn from_info(info: &VideoInfo) -> Self {
        Self {
            title: info.title_or_default(),
            author: info.uploader.clone(),
            duration: info.duration_secs(),
            thumbnail_url: info.thumbnail.clone(),
            view_count: info.view_count,
            source_id: info.id.clone(),
            formats: info.formats.iter().filter_map(summarize).collect(),
        }
    }
}

fn has_codec(codec: &Option<String>) -> bool {
    // an absent codec field means "unknown", not "none"
    codec.as_deref() != Some("none")
}

/// Video entries are anything with a video codec; audio-only entries have an
/// audio codec but no video. Entries with neither (storyboards) are dropped.
fn summarize(f: &RawFormat) -> Option<FormatSummary> {
    let filesize = f.filesize.or(f.filesize_approx);
    if has_codec(&f.vcodec) {
        Some(FormatSummary::Video {
            format_id: f.format_id.clone(),
            resolution: f
                .resolution
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            fps: f.fps,
            extension: f.ext.clone(),
            filesize,
        })
    } else if has_codec(&f.acodec) {
        Some(FormatSummary::Audio {
            format_id: f.format_id.clone(),
            bitrate: f.abr.unwrap_or(0.0),
            extension: f.ext.clone(),
            filesize,
        })
    } else {
        None
    }
}
