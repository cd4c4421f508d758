//! 下载计划准备：URL 规范化、输出文件名生成、格式选择与后处理步骤。

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use super::models::{FetchPlan, PostStep, Quality};
use super::trim::TrimRange;
use crate::base_system::context::{Config, StorageLayout};
use crate::catalog::MediaKind;

const MAX_STEM_LEN: usize = 120;

/// 编排器所需的配置子集。
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub layout: StorageLayout,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub video_container: String,
    pub metadata_album: String,
    pub thumbnail_fetch_timeout_secs: u64,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            layout: cfg.layout(),
            audio_codec: cfg.audio_codec.trim().to_ascii_lowercase(),
            audio_bitrate_kbps: cfg.audio_bitrate_kbps,
            video_container: cfg.video_container.trim().to_ascii_lowercase(),
            metadata_album: cfg.metadata_album.clone(),
            thumbnail_fetch_timeout_secs: cfg.thumbnail_fetch_timeout_secs,
        }
    }

    pub fn output_dir(&self, kind: MediaKind) -> PathBuf {
        match kind {
            MediaKind::Audio => self.layout.audio.clone(),
            MediaKind::Video => self.layout.video.clone(),
        }
    }
}

/// Undo the percent-encoding of `=` and `&` that some clients apply to the
/// whole URL (e.g. `watch?v%3Dabc%26t%3D10`).
pub fn normalize_url(raw: &str) -> String {
    raw.trim()
        .replace("%3D", "=")
        .replace("%3d", "=")
        .replace("%26", "&")
}

/// Reduce `raw` to a filesystem-safe token: ASCII letters, digits, `-`, `_`
/// and inner dots survive, whitespace runs become `_`, everything else is
/// dropped. Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORES: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    let underscores = UNDERSCORES.get_or_init(|| Regex::new(r"_{2,}").expect("static regex"));

    let spaced = spaces.replace_all(raw.trim(), "_");
    let kept: String = spaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let collapsed = underscores.replace_all(&kept, "_");
    let mut cleaned = collapsed.trim_matches(|c| c == '.' || c == '_').to_string();

    if cleaned.len() > MAX_STEM_LEN {
        cleaned.truncate(MAX_STEM_LEN);
        cleaned = cleaned.trim_end_matches(['.', '_']).to_string();
    }

    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Output file stem. A client-supplied name is sanitized and used as-is
/// (the orchestrator suffixes it if the path is taken); otherwise the title
/// gets a short random suffix so concurrent downloads of the same video do
/// not collide.
pub fn output_stem(requested: Option<&str>, title: &str) -> String {
    if let Some(name) = requested.and_then(sanitize_filename) {
        return name;
    }
    let base = sanitize_filename(title).unwrap_or_else(|| "video".to_string());
    with_random_suffix(&base)
}

/// `<stem>_<8 hex chars>`.
pub fn with_random_suffix(stem: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", stem, &suffix[..8])
}

pub fn video_format_selector(quality: Quality, container: &str) -> String {
    let audio_ext = if container == "mp4" { "m4a" } else { container };
    match quality {
        Quality::Best => {
            format!("bestvideo[ext={container}]+bestaudio[ext={audio_ext}]/best[ext={container}]/best")
        }
        Quality::MaxHeight(h) => format!(
            "bestvideo[height<={h}][ext={container}]+bestaudio[ext={audio_ext}]/best[height<={h}][ext={container}]/best"
        ),
    }
}

pub fn build_fetch_plan(
    settings: &PipelineSettings,
    url: &str,
    kind: MediaKind,
    quality: Quality,
    file_stem: String,
    trim: Option<TrimRange>,
    include_metadata: bool,
) -> FetchPlan {
    let (format_selector, mut steps) = match kind {
        MediaKind::Audio => (
            "bestaudio/best".to_string(),
            vec![
                PostStep::ExtractAudio {
                    codec: settings.audio_codec.clone(),
                    bitrate_kbps: settings.audio_bitrate_kbps,
                },
                PostStep::WriteSourceMetadata,
                PostStep::WriteThumbnail,
            ],
        ),
        MediaKind::Video => (
            video_format_selector(quality, &settings.video_container),
            vec![
                PostStep::MergeInto {
                    container: settings.video_container.clone(),
                },
                PostStep::WriteThumbnail,
            ],
        ),
    };
    // The thumbnail only exists to be embedded.
    if !include_metadata {
        steps.retain(|s| *s != PostStep::WriteThumbnail);
    }

    FetchPlan {
        url: url.to_string(),
        kind,
        format_selector,
        output_dir: settings.output_dir(kind),
        file_stem,
        steps,
        trim,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings(root: &std::path::Path) -> PipelineSettings {
        let mut cfg = Config::default();
        cfg.download_dir = root.to_string_lossy().to_string();
        PipelineSettings::from_config(&cfg)
    }

    #[test]
    fn normalizes_encoded_query() {
        assert_eq!(
            normalize_url(" https://www.youtube.com/watch?v%3Dabc%26t%3D10 "),
            "https://www.youtube.com/watch?v=abc&t=10"
        );
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_filename("My Song (Live) 2024!").as_deref(), Some("My_Song_Live_2024"));
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("etcpasswd"));
        assert_eq!(sanitize_filename("  ..hidden..  ").as_deref(), Some("hidden"));
        assert_eq!(sanitize_filename("日本語"), None);
        assert_eq!(sanitize_filename("a".repeat(300).as_str()).map(|s| s.len()), Some(120));
    }

    #[test]
    fn stem_prefers_requested_name() {
        assert_eq!(output_stem(Some("my file"), "ignored"), "my_file");
        let derived = output_stem(Some("???"), "Cool Video");
        assert!(derived.starts_with("Cool_Video_"));
        assert_eq!(derived.len(), "Cool_Video_".len() + 8);
        assert!(output_stem(None, "日本語").starts_with("video_"));
        let suffixed = with_random_suffix("same");
        assert!(suffixed.starts_with("same_"));
        assert_ne!(suffixed, with_random_suffix("same"));
    }

    #[test]
    fn no_thumbnail_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let plan = build_fetch_plan(&s, "u", MediaKind::Audio, Quality::Best, "x".into(), None, false);
        assert!(!plan.steps.contains(&PostStep::WriteThumbnail));
        assert_eq!(plan.final_extension(), Some("mp3"));
        let plan = build_fetch_plan(&s, "u", MediaKind::Video, Quality::Best, "x".into(), None, false);
        assert!(!plan.steps.contains(&PostStep::WriteThumbnail));
    }

    #[test]
    fn audio_plan_extracts_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let plan = build_fetch_plan(&s, "u", MediaKind::Audio, Quality::Best, "x".into(), None, true);
        assert_eq!(plan.format_selector, "bestaudio/best");
        assert_eq!(plan.output_dir, dir.path().join("audio"));
        assert_eq!(plan.final_extension(), Some("mp3"));
        assert!(plan.steps.contains(&PostStep::WriteSourceMetadata));
        assert_eq!(plan.output_template(), dir.path().join("audio").join("x.%(ext)s"));
    }

    #[test]
    fn video_plan_caps_height() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let plan = build_fetch_plan(
            &s,
            "u",
            MediaKind::Video,
            Quality::MaxHeight(720),
            "x".into(),
            None,
            true,
        );
        assert_eq!(
            plan.format_selector,
            "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[height<=720][ext=mp4]/best"
        );
        assert_eq!(plan.final_extension(), Some("mp4"));
        assert_eq!(
            video_format_selector(Quality::Best, "webm"),
            "bestvideo[ext=webm]+bestaudio[ext=webm]/best[ext=webm]/best"
        );
    }
}
