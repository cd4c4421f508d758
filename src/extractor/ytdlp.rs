//! yt-dlp 子进程实现。

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::{ExtractError, MediaExtractor, VideoInfo};
use crate::download::models::{FetchPlan, PostStep};

#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            ffmpeg_location: None,
        }
    }

    /// Where yt-dlp should look for ffmpeg (file or directory).
    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    fn run(&self, args: &[String]) -> Result<String, ExtractError> {
        debug!(target: "extractor", bin = %self.bin.display(), ?args, "spawning extractor");
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExtractError::Spawn {
                bin: self.bin.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MediaExtractor for YtDlp {
    fn probe(&self, url: &str) -> Result<VideoInfo, ExtractError> {
        let args = probe_args(url);
        let stdout = self.run(&args)?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| ExtractError::Parse(format!("info json: {e}")))
    }

    fn fetch(&self, plan: &FetchPlan) -> Result<VideoInfo, ExtractError> {
        let args = fetch_args(plan, self.ffmpeg_location.as_deref());
        info!(target: "extractor", url = %plan.url, kind = %plan.kind, "fetch started");
        let stdout = self.run(&args)?;
        parse_fetch_output(&stdout)
    }
}

pub fn probe_args(url: &str) -> Vec<String> {
    [
        "--dump-single-json",
        "--skip-download",
        "--no-playlist",
        "--no-warnings",
        url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn fetch_args(plan: &FetchPlan, ffmpeg_location: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--no-warnings".into(),
        "--no-progress".into(),
        "-f".into(),
        plan.format_selector.clone(),
        "-o".into(),
        plan.output_template().to_string_lossy().into_owned(),
    ];

    if let Some(loc) = ffmpeg_location {
        args.push("--ffmpeg-location".into());
        args.push(loc.to_string_lossy().into_owned());
    }

    for step in &plan.steps {
        match step {
            PostStep::ExtractAudio {
                codec,
                bitrate_kbps,
            } => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push(codec.clone());
                args.push("--audio-quality".into());
                args.push(format!("{bitrate_kbps}K"));
            }
            PostStep::MergeInto { container } => {
                args.push("--merge-output-format".into());
                args.push(container.clone());
            }
            PostStep::WriteSourceMetadata => args.push("--embed-metadata".into()),
            PostStep::WriteThumbnail => args.push("--write-thumbnail".into()),
        }
    }

    // Cut before post-processing so tagging and the size on disk see the
    // trimmed file.
    if let Some(trim) = &plan.trim {
        args.push("--download-sections".into());
        args.push(trim.section_spec());
        args.push("--force-keyframes-at-cuts".into());
    }

    // Printing the info dict after the final move implies no simulation and
    // gives us the real output path.
    args.push("--print".into());
    args.push("after_move:%()j".into());
    args.push(plan.url.clone());
    args
}

/// The last JSON line on stdout is the post-move info dict. Older builds that
/// only print a bare path are tolerated.
fn parse_fetch_output(stdout: &str) -> Result<VideoInfo, ExtractError> {
    let mut last_path: Option<PathBuf> = None;
    for line in stdout.lines().rev().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('{') {
            return serde_json::from_str(line)
                .map_err(|e| ExtractError::Parse(format!("fetch json: {e}")));
        }
        if last_path.is_none() {
            last_path = Some(PathBuf::from(line));
        }
    }
    match last_path {
        Some(p) => Ok(VideoInfo {
            filepath: Some(p),
            ..VideoInfo::default()
        }),
        None => Err(ExtractError::Parse("extractor printed nothing".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MediaKind;
    use crate::download::models::Quality;
    use crate::download::plan::{build_fetch_plan, tests::settings};
    use crate::download::trim::TrimRange;

    fn pair(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn audio_args_extract_at_fixed_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let plan = build_fetch_plan(
            &settings(dir.path()),
            "https://youtu.be/abc",
            MediaKind::Audio,
            Quality::Best,
            "song".into(),
            None,
            true,
        );
        let args = fetch_args(&plan, Some(Path::new("/opt/ffmpeg/bin")));

        assert_eq!(pair(&args, "-f").as_deref(), Some("bestaudio/best"));
        assert_eq!(pair(&args, "--audio-format").as_deref(), Some("mp3"));
        assert_eq!(pair(&args, "--audio-quality").as_deref(), Some("192K"));
        assert_eq!(pair(&args, "--ffmpeg-location").as_deref(), Some("/opt/ffmpeg/bin"));
        assert!(args.contains(&"--embed-metadata".to_string()));
        assert!(args.contains(&"--write-thumbnail".to_string()));
        assert!(!args.contains(&"--download-sections".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
        assert!(pair(&args, "-o").unwrap().ends_with("song.%(ext)s"));
    }

    #[test]
    fn trimmed_video_args() {
        let dir = tempfile::tempdir().unwrap();
        let plan = build_fetch_plan(
            &settings(dir.path()),
            "u",
            MediaKind::Video,
            Quality::MaxHeight(480),
            "clip".into(),
            Some(TrimRange {
                start: Some(30),
                end: None,
            }),
            true,
        );
        let args = fetch_args(&plan, None);
        assert_eq!(pair(&args, "--merge-output-format").as_deref(), Some("mp4"));
        assert_eq!(pair(&args, "--download-sections").as_deref(), Some("*30-inf"));
        assert!(args.contains(&"--force-keyframes-at-cuts".to_string()));
        assert!(!args.contains(&"--extract-audio".to_string()));
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn parses_post_move_json() {
        let out = "[info] noise\n{\"id\":\"abc\",\"title\":\"T\",\"filepath\":\"/d/audio/t.mp3\",\"duration\":10}\n";
        let info = parse_fetch_output(out).unwrap();
        assert_eq!(info.filepath, Some(PathBuf::from("/d/audio/t.mp3")));
        assert_eq!(info.id.as_deref(), Some("abc"));
    }

    #[test]
    fn falls_back_to_bare_path() {
        let info = parse_fetch_output("/d/video/t.mp4\n").unwrap();
        assert_eq!(info.filepath, Some(PathBuf::from("/d/video/t.mp4")));
        assert!(parse_fetch_output("\n\n").is_err());
    }
}
