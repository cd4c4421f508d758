//! 下载相关的数据模型定义。
//!
//! 包含下载请求、画质选择、下载计划（交给外部抓取工具的完整指令）与下载结果。

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::trim::TrimRange;
use crate::catalog::MediaKind;

/// `POST /api/download` 的请求体。所有字段均可缺省，由编排器负责校验。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub download_type: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "metadata")]
    pub include_metadata: Option<bool>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub trim_start: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub trim_end: Option<String>,
}

// Clients send trims either as "1:30" or as a bare number of seconds.
fn string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    MaxHeight(u32),
}

impl Quality {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "best" | "highest" => return Some(Quality::Best),
            "4k" => return Some(Quality::MaxHeight(2160)),
            _ => {}
        }
        let digits = s.strip_suffix('p').unwrap_or(&s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match digits.parse::<u32>() {
            Ok(h) if h > 0 => Some(Quality::MaxHeight(h)),
            _ => None,
        }
    }
}

/// 抓取完成后由外部工具执行的后处理步骤。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostStep {
    ExtractAudio { codec: String, bitrate_kbps: u32 },
    MergeInto { container: String },
    WriteSourceMetadata,
    WriteThumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub url: String,
    pub kind: MediaKind,
    pub format_selector: String,
    pub output_dir: PathBuf,
    pub file_stem: String,
    pub steps: Vec<PostStep>,
    pub trim: Option<TrimRange>,
}

impl FetchPlan {
    /// Output template; the extractor substitutes the real extension.
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(format!("{}.%(ext)s", self.file_stem))
    }

    pub fn path_with_ext(&self, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.file_stem, ext))
    }

    /// The container the finished file is expected to have.
    pub fn final_extension(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| match s {
            PostStep::ExtractAudio { codec, .. } => Some(codec.as_str()),
            PostStep::MergeInto { container } => Some(container.as_str()),
            _ => None,
        })
    }
}

/// 成功下载后返回给客户端的结果。
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub success: bool,
    pub message: String,
    pub title: String,
    pub download_url: String,
    pub file_type: String,
    pub mime_type: String,
    pub file_size: u64,
    pub duration: Option<u64>,
    pub media_id: String,
    pub thumbnail_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tokens() {
        assert_eq!(Quality::parse("best"), Some(Quality::Best));
        assert_eq!(Quality::parse("HIGHEST"), Some(Quality::Best));
        assert_eq!(Quality::parse("720p"), Some(Quality::MaxHeight(720)));
        assert_eq!(Quality::parse("1080"), Some(Quality::MaxHeight(1080)));
        assert_eq!(Quality::parse("4K"), Some(Quality::MaxHeight(2160)));
        assert_eq!(Quality::parse("0p"), None);
        assert_eq!(Quality::parse("hd"), None);
        assert_eq!(Quality::parse("p"), None);
    }

    #[test]
    fn request_accepts_numeric_trims() {
        let req: DownloadRequest = serde_json::from_value(serde_json::json!({
            "url": "https://youtu.be/x",
            "metadata": false,
            "trim_start": 90,
            "trim_end": "2:00"
        }))
        .unwrap();
        assert_eq!(req.trim_start.as_deref(), Some("90"));
        assert_eq!(req.trim_end.as_deref(), Some("2:00"));
        assert_eq!(req.include_metadata, Some(false));
        assert!(req.download_type.is_none());
    }

    #[test]
    fn request_rejects_object_trim() {
        let res: Result<DownloadRequest, _> =
            serde_json::from_value(serde_json::json!({ "trim_start": { "s": 1 } }));
        assert!(res.is_err());
    }
}
