//! 元数据与封面写入。
//!
//! 下载完成后用 ffmpeg 重新封装一次：写入标题、作者、专辑等标签，并把
//! 抓取工具落在同目录下的缩略图作为封面嵌入。没有本地缩略图时回退到远程
//! 缩略图地址。写入先落到同目录的临时文件，成功后再原子替换原文件。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::toolchain::{ToolchainError, Transcoder};
use crate::catalog::MediaKind;
use crate::third_party::media_fetch;

/// Extensions the extractor uses when it writes a thumbnail next to the media.
pub const THUMBNAIL_EXTS: [&str; 4] = ["webp", "jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("media file not found: {0}")]
    MissingFile(PathBuf),
    #[error("tagging io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub cover_embedded: bool,
    pub thumbnail_removed: bool,
}

pub struct MetadataEmbedder {
    transcoder: Arc<dyn Transcoder>,
    scratch_dir: PathBuf,
    thumbnail_timeout: Duration,
}

impl MetadataEmbedder {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        scratch_dir: impl Into<PathBuf>,
        thumbnail_timeout: Duration,
    ) -> Self {
        Self {
            transcoder,
            scratch_dir: scratch_dir.into(),
            thumbnail_timeout,
        }
    }

    pub fn embed(
        &self,
        file: &Path,
        kind: MediaKind,
        tags: &TagSet,
        thumbnail_url: Option<&str>,
    ) -> Result<EmbedReport, TaggingError> {
        if !file.is_file() {
            return Err(TaggingError::MissingFile(file.to_path_buf()));
        }

        let sibling = find_sibling_thumbnail(file);
        let fetched = match (&sibling, thumbnail_url) {
            (None, Some(url)) => self.fetch_remote_cover(file, url),
            _ => None,
        };
        let cover = sibling.as_deref().or(fetched.as_deref());

        let result = self.rewrite(file, kind, tags, cover);
        let result = match result {
            Err(e) if cover.is_some() => {
                warn!(target: "tagging", file = %file.display(), error = %e, "cover embed failed, retrying tags only");
                self.rewrite(file, kind, tags, None).map(|_| false)
            }
            other => other,
        };

        if let Some(tmp) = &fetched {
            let _ = std::fs::remove_file(tmp);
        }
        // The sibling goes whether or not the rewrite worked.
        let thumbnail_removed = match &sibling {
            Some(thumb) => match std::fs::remove_file(thumb) {
                Ok(()) => true,
                Err(e) => {
                    warn!(target: "tagging", path = %thumb.display(), error = %e, "failed to remove thumbnail");
                    false
                }
            },
            None => false,
        };

        let report = EmbedReport {
            cover_embedded: result?,
            thumbnail_removed,
        };
        info!(
            target: "tagging",
            file = %file.display(),
            cover = report.cover_embedded,
            "metadata written"
        );
        Ok(report)
    }

    // Returns whether a cover was part of the rewrite.
    fn rewrite(
        &self,
        file: &Path,
        kind: MediaKind,
        tags: &TagSet,
        cover: Option<&Path>,
    ) -> Result<bool, TaggingError> {
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        // Same directory so the final rename never crosses filesystems.
        let tmp = tempfile::Builder::new()
            .prefix(".tag-")
            .suffix(&format!(".{ext}"))
            .tempfile_in(dir)?
            .into_temp_path();

        let args = ffmpeg_args(kind, file, cover, &tmp, tags);
        debug!(target: "tagging", ?args, "rewriting container");
        self.transcoder.run(&args)?;
        tmp.persist(file).map_err(|e| TaggingError::Io(e.error))?;
        Ok(cover.is_some())
    }

    fn fetch_remote_cover(&self, file: &Path, url: &str) -> Option<PathBuf> {
        if std::fs::create_dir_all(&self.scratch_dir).is_err() {
            return None;
        }
        let stem = format!("cover-{}", uuid::Uuid::new_v4().simple());
        let got = media_fetch::fetch_to_dir(url, &self.scratch_dir, &stem, self.thumbnail_timeout);
        if got.is_none() {
            debug!(target: "tagging", file = %file.display(), url, "remote thumbnail unavailable");
        }
        got
    }
}

/// `<dir>/<stem>.<ext>` for the first known thumbnail extension that exists.
pub fn find_sibling_thumbnail(file: &Path) -> Option<PathBuf> {
    THUMBNAIL_EXTS
        .iter()
        .map(|ext| file.with_extension(ext))
        .find(|p| p.is_file())
}

pub fn ffmpeg_args(
    kind: MediaKind,
    input: &Path,
    cover: Option<&Path>,
    output: &Path,
    tags: &TagSet,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];
    if let Some(c) = cover {
        args.push("-i".into());
        args.push(c.to_string_lossy().into_owned());
    }

    let is_mp3 = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp3"));

    match (kind, cover.is_some()) {
        (MediaKind::Audio, true) => {
            args.extend(
                [
                    "-map", "0:a", "-map", "1:0", "-c:a", "copy", "-c:v", "mjpeg",
                    "-metadata:s:v", "title=Album cover",
                    "-metadata:s:v", "comment=Cover (front)",
                    "-disposition:v", "attached_pic",
                ]
                .map(String::from),
            );
        }
        (MediaKind::Video, true) => {
            args.extend(
                [
                    "-map", "0", "-map", "1:0", "-c", "copy", "-c:v:1", "mjpeg",
                    "-disposition:v:1", "attached_pic",
                ]
                .map(String::from),
            );
        }
        (_, false) => {
            args.extend(["-map", "0", "-c", "copy"].map(String::from));
        }
    }
    if is_mp3 {
        args.extend(["-id3v2_version", "3"].map(String::from));
    }

    push_tag(&mut args, "title", &tags.title);
    push_tag(
        &mut args,
        "artist",
        tags.artist.as_deref().unwrap_or("Unknown"),
    );
    if kind == MediaKind::Audio
        && let Some(album) = tags.album.as_deref()
    {
        push_tag(&mut args, "album", album);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

fn push_tag(args: &mut Vec<String>, key: &str, value: &str) {
    args.push("-metadata".into());
    args.push(format!("{key}={value}"));
}
