//! 下载主流程编排。
//!
//! 一次请求依次经过：参数校验 → ffmpeg 可用性检查 → URL 规范化 → 探测标题
//! → 生成抓取计划 → 抓取与转码 → 确定输出文件 → 写入元数据（失败不致命）
//! → 入库（失败不致命）→ 返回结果。整个流程是阻塞的，调用方负责放进
//! `spawn_blocking`。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::DownloadError;
use super::models::{DownloadOutcome, DownloadRequest, FetchPlan, Quality};
use super::plan::{
    PipelineSettings, build_fetch_plan, normalize_url, output_stem, with_random_suffix,
};
use super::trim::TrimRange;
use crate::catalog::models::mime_for_extension;
use crate::catalog::{MediaKind, MediaRecord, SqliteCatalog};
use crate::extractor::formats::InfoSummary;
use crate::extractor::{ExtractError, MediaExtractor, VideoInfo};
use crate::postprocess::{FFMPEG_REMEDIATION, MetadataEmbedder, TagSet, Transcoder};

/// 校验通过后的请求参数。
#[derive(Debug, Clone, PartialEq)]
struct ValidatedRequest {
    url: String,
    kind: MediaKind,
    quality_label: String,
    quality: Quality,
    filename: Option<String>,
    include_metadata: bool,
    trim: Option<TrimRange>,
}

fn validate(req: &DownloadRequest) -> Result<ValidatedRequest, DownloadError> {
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| DownloadError::validation("URL is required"))?;

    let kind = match req.download_type.as_deref().map(str::trim) {
        None | Some("") => MediaKind::Audio,
        Some(raw) => raw.parse::<MediaKind>().map_err(|_| {
            DownloadError::validation(format!(
                "Invalid download_type '{raw}': expected 'audio' or 'video'"
            ))
        })?,
    };

    let quality_label = req
        .quality
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or("best")
        .to_string();
    // Audio always takes the best stream; the label is only recorded.
    let quality = match kind {
        MediaKind::Audio => Quality::Best,
        MediaKind::Video => Quality::parse(&quality_label).ok_or_else(|| {
            DownloadError::validation(format!(
                "Invalid quality '{quality_label}': expected best, highest, 4k or a height like 720p"
            ))
        })?,
    };

    let trim = TrimRange::from_request(req.trim_start.as_deref(), req.trim_end.as_deref())
        .map_err(|e| DownloadError::validation(e.to_string()))?;
    if let Some(t) = &trim
        && !t.is_ordered()
    {
        return Err(DownloadError::validation(
            "trim_start must be earlier than trim_end",
        ));
    }

    Ok(ValidatedRequest {
        url: url.to_string(),
        kind,
        quality_label,
        quality,
        filename: req.filename.clone(),
        include_metadata: req.include_metadata.unwrap_or(true),
        trim,
    })
}

pub struct Downloader {
    settings: PipelineSettings,
    extractor: Arc<dyn MediaExtractor>,
    transcoder: Arc<dyn Transcoder>,
    embedder: MetadataEmbedder,
    catalog: SqliteCatalog,
}

impl Downloader {
    pub fn new(
        settings: PipelineSettings,
        extractor: Arc<dyn MediaExtractor>,
        transcoder: Arc<dyn Transcoder>,
        catalog: SqliteCatalog,
    ) -> Self {
        let embedder = MetadataEmbedder::new(
            transcoder.clone(),
            settings.layout.temp.clone(),
            Duration::from_secs(settings.thumbnail_fetch_timeout_secs),
        );
        Self {
            settings,
            extractor,
            transcoder,
            embedder,
            catalog,
        }
    }

    /// 只解析信息与格式列表，不下载。
    pub fn probe(&self, url: &str) -> Result<InfoSummary, DownloadError> {
        let url = normalize_url(url);
        if url.is_empty() {
            return Err(DownloadError::validation("URL parameter is required"));
        }
        let info = self.extractor.probe(&url).map_err(|e| {
            warn!(target: "download", url = %url, error = %e, "探测失败");
            DownloadError::upstream(e.reason())
        })?;
        Ok(InfoSummary::from_info(&info))
    }

    pub fn run(&self, req: DownloadRequest) -> Result<DownloadOutcome, DownloadError> {
        let req = validate(&req)?;

        self.transcoder.ensure_available().map_err(|e| {
            error!(target: "download", error = %e, "ffmpeg 不可用");
            DownloadError::Configuration(FFMPEG_REMEDIATION.to_string())
        })?;

        let url = normalize_url(&req.url);
        info!(target: "download", url = %url, kind = %req.kind, quality = %req.quality_label, "开始下载");

        let info = self.extractor.probe(&url).map_err(upstream)?;
        let stem = output_stem(req.filename.as_deref(), &info.title_or_default());
        let stem = self.claim_stem(req.kind, stem)?;
        let plan = build_fetch_plan(
            &self.settings,
            &url,
            req.kind,
            req.quality,
            stem,
            req.trim,
            req.include_metadata,
        );
        debug!(target: "download", selector = %plan.format_selector, stem = %plan.file_stem, "抓取计划就绪");

        let fetched = self.extractor.fetch(&plan).map_err(upstream)?;
        let path = resolve_output(&plan, &fetched).map_err(upstream)?;

        let title = fetched
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| info.title_or_default());
        let author = info.uploader.clone().or_else(|| fetched.uploader.clone());
        let thumbnail = info.thumbnail.clone().or_else(|| fetched.thumbnail.clone());

        if req.include_metadata {
            let tags = TagSet {
                title: title.clone(),
                artist: author.clone(),
                album: Some(self.settings.metadata_album.clone()),
            };
            if let Err(e) = self
                .embedder
                .embed(&path, req.kind, &tags, thumbnail.as_deref())
            {
                warn!(target: "tagging", file = %path.display(), error = %e, "元数据写入失败，继续");
            }
        }

        let size = std::fs::metadata(&path)?.len();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let record = MediaRecord {
            id: Uuid::new_v4().to_string(),
            title: title.clone(),
            author,
            duration: info.duration_secs().or_else(|| fetched.duration_secs()),
            size,
            format: format.clone(),
            kind: req.kind,
            quality: req.quality_label.clone(),
            thumbnail: thumbnail.clone(),
            path: path.clone(),
            created_at: String::new(),
            source_id: info.id.clone().or_else(|| fetched.id.clone()),
        };
        if let Err(e) = self.catalog.insert(&record) {
            // The file stays on disk; only the library entry is missing.
            error!(target: "catalog", id = %record.id, error = %e, "媒体记录入库失败");
        }

        info!(target: "download", id = %record.id, file = %path.display(), size, "下载完成");
        Ok(DownloadOutcome {
            success: true,
            message: format!("{} downloaded successfully", capitalize(req.kind.as_str())),
            title,
            download_url: format!("/media/{}", record.id),
            file_type: format,
            mime_type: mime_for_extension(record.format.as_str()).to_string(),
            file_size: size,
            duration: record.duration,
            media_id: record.id,
            thumbnail_url: thumbnail,
        })
    }

    /// Keep one file per record: a stem whose final path is already on disk
    /// or in the catalog gets a random suffix.
    fn claim_stem(&self, kind: MediaKind, stem: String) -> Result<String, DownloadError> {
        let dir = self.settings.output_dir(kind);
        let ext = match kind {
            MediaKind::Audio => &self.settings.audio_codec,
            MediaKind::Video => &self.settings.video_container,
        };
        let path = dir.join(format!("{stem}.{ext}"));
        if !path.exists() && !self.catalog.has_path(&path)? {
            return Ok(stem);
        }
        let claimed = with_random_suffix(&stem);
        debug!(target: "download", taken = %path.display(), stem = %claimed, "输出文件名已被占用，追加后缀");
        Ok(claimed)
    }
}

fn upstream(e: ExtractError) -> DownloadError {
    warn!(target: "download", error = %e, "抓取失败");
    DownloadError::upstream(e.reason())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Find the finished file. The extractor's report wins; for audio an
/// intermediate container in the report is swapped for the final codec
/// extension; the planned path is the last resort.
fn resolve_output(plan: &FetchPlan, fetched: &VideoInfo) -> Result<PathBuf, ExtractError> {
    let final_ext = plan.final_extension();
    let mut candidates: Vec<PathBuf> = Vec::new();
    for reported in [&fetched.filepath, &fetched.filename].into_iter().flatten() {
        candidates.push(reported.clone());
        if plan.kind == MediaKind::Audio
            && let Some(ext) = final_ext
        {
            candidates.push(reported.with_extension(ext));
        }
    }
    let planned = plan.path_with_ext(final_ext.unwrap_or("mp4"));
    candidates.push(planned.clone());

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or(ExtractError::MissingOutput(planned))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::download::models::PostStep;
    use crate::download::plan::tests::settings;
    use crate::postprocess::toolchain::ToolchainError;
    use crate::postprocess::tagging::tests::CopyingTranscoder;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory extractor: writes a small file where the real tool would
    /// and counts calls.
    #[derive(Default)]
    pub(crate) struct FakeExtractor {
        pub probes: AtomicUsize,
        pub fetches: AtomicUsize,
        pub fail_fetch: Option<String>,
        /// Report this extension instead of the real one (intermediate container).
        pub report_ext: Option<String>,
        pub last_plan: Mutex<Option<FetchPlan>>,
    }

    impl MediaExtractor for FakeExtractor {
        fn probe(&self, _url: &str) -> Result<VideoInfo, ExtractError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(VideoInfo {
                id: Some("dQw4w9WgXcQ".into()),
                title: Some("Never Gonna Give You Up".into()),
                uploader: Some("Rick Astley".into()),
                duration: Some(212.4),
                thumbnail: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg".into()),
                ..VideoInfo::default()
            })
        }

        fn fetch(&self, plan: &FetchPlan) -> Result<VideoInfo, ExtractError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            *self.last_plan.lock().unwrap() = Some(plan.clone());
            if let Some(stderr) = &self.fail_fetch {
                return Err(ExtractError::Failed {
                    code: Some(1),
                    stderr: stderr.clone(),
                });
            }
            std::fs::create_dir_all(&plan.output_dir).unwrap();
            let ext = plan.final_extension().unwrap();
            let file = plan.path_with_ext(ext);
            std::fs::write(&file, media_bytes()).unwrap();
            if plan.steps.contains(&PostStep::WriteThumbnail) {
                std::fs::write(plan.path_with_ext("webp"), b"thumb").unwrap();
            }
            let reported = match &self.report_ext {
                Some(other) => plan.path_with_ext(other),
                None => file,
            };
            Ok(VideoInfo {
                title: Some("Never Gonna Give You Up".into()),
                filepath: Some(reported),
                ..VideoInfo::default()
            })
        }
    }

    /// Patterned so a wrong seek offset shows up in the served bytes.
    pub(crate) fn media_bytes() -> Vec<u8> {
        (0..4096u32).map(|i| (i % 251) as u8).collect()
    }

    pub(crate) struct MissingFfmpeg;

    impl Transcoder for MissingFfmpeg {
        fn ensure_available(&self) -> Result<(), ToolchainError> {
            Err(ToolchainError::Missing {
                bin: "ffmpeg".into(),
                reason: "No such file or directory".into(),
            })
        }

        fn location(&self) -> Option<PathBuf> {
            None
        }

        fn run(&self, _args: &[String]) -> Result<(), ToolchainError> {
            unreachable!("ffmpeg must not run when unavailable")
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        extractor: Arc<FakeExtractor>,
        transcoder: Arc<CopyingTranscoder>,
        catalog: SqliteCatalog,
        downloader: Downloader,
    }

    fn harness(extractor: FakeExtractor) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        settings.layout.ensure().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("media.db"));
        catalog.initialize().unwrap();
        let extractor = Arc::new(extractor);
        let transcoder = Arc::new(CopyingTranscoder::default());
        let downloader = Downloader::new(
            settings,
            extractor.clone(),
            transcoder.clone(),
            catalog.clone(),
        );
        Harness {
            _dir: dir,
            extractor,
            transcoder,
            catalog,
            downloader,
        }
    }

    fn request(url: &str) -> DownloadRequest {
        DownloadRequest {
            url: Some(url.into()),
            ..DownloadRequest::default()
        }
    }

    #[test]
    fn audio_download_is_tagged_and_cataloged() {
        let h = harness(FakeExtractor::default());
        let out = h.downloader.run(request("https://youtu.be/dQw4w9WgXcQ")).unwrap();

        assert!(out.success);
        assert_eq!(out.file_type, "mp3");
        assert_eq!(out.mime_type, "audio/mpeg");
        assert_eq!(out.file_size, 4096);
        assert_eq!(out.duration, Some(212));
        assert_eq!(out.download_url, format!("/media/{}", out.media_id));

        let rec = h.catalog.get(&out.media_id).unwrap().unwrap();
        assert_eq!(rec.kind, MediaKind::Audio);
        assert_eq!(rec.quality, "best");
        assert_eq!(rec.author.as_deref(), Some("Rick Astley"));
        assert_eq!(rec.source_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert!(rec.path.starts_with(&h.downloader.settings.layout.audio));
        assert!(rec.path.is_absolute());

        // cover embedded, sibling thumbnail gone
        assert_eq!(h.transcoder.calls.lock().unwrap().len(), 1);
        assert!(!rec.path.with_extension("webp").exists());
    }

    #[test]
    fn missing_url_never_fetches() {
        let h = harness(FakeExtractor::default());
        let err = h.downloader.run(DownloadRequest::default()).unwrap_err();
        assert!(matches!(err, DownloadError::Validation(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.extractor.probes.load(Ordering::SeqCst), 0);
        assert_eq!(h.extractor.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_ffmpeg_fails_before_probe() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let downloader = Downloader::new(
            settings(dir.path()),
            extractor.clone(),
            Arc::new(MissingFfmpeg),
            SqliteCatalog::new(dir.path().join("media.db")),
        );
        let err = downloader.run(request("https://youtu.be/x")).unwrap_err();
        assert!(matches!(err, DownloadError::Configuration(ref m) if m.contains("FFmpeg")));
        assert_eq!(extractor.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fetch_failure_is_upstream_with_reason() {
        let h = harness(FakeExtractor {
            fail_fetch: Some("WARNING: x\nERROR: Sign in to confirm you're not a bot".into()),
            ..FakeExtractor::default()
        });
        let err = h.downloader.run(request("https://youtu.be/x")).unwrap_err();
        match err {
            DownloadError::Upstream { message } => {
                assert_eq!(message, "ERROR: Sign in to confirm you're not a bot")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.catalog.list_all().unwrap().is_empty());
    }

    #[test]
    fn intermediate_audio_extension_is_normalized() {
        let h = harness(FakeExtractor {
            report_ext: Some("webm".into()),
            ..FakeExtractor::default()
        });
        let out = h
            .downloader
            .run(DownloadRequest {
                include_metadata: Some(false),
                ..request("https://youtu.be/x")
            })
            .unwrap();
        assert_eq!(out.file_type, "mp3");
        assert_eq!(h.transcoder.calls.lock().unwrap().len(), 0);
    }

    #[test]
    fn video_with_named_file_and_trim() {
        let h = harness(FakeExtractor::default());
        let out = h
            .downloader
            .run(DownloadRequest {
                download_type: Some("video".into()),
                quality: Some("720p".into()),
                filename: Some("my clip".into()),
                trim_start: Some("0:30".into()),
                trim_end: Some("1:00".into()),
                ..request("https://youtu.be/x")
            })
            .unwrap();
        assert_eq!(out.mime_type, "video/mp4");

        let plan = h.extractor.last_plan.lock().unwrap().clone().unwrap();
        assert_eq!(plan.file_stem, "my_clip");
        assert_eq!(plan.trim.map(|t| t.section_spec()).as_deref(), Some("*30-60"));
        assert!(plan.format_selector.contains("height<=720"));
        let rec = h.catalog.get(&out.media_id).unwrap().unwrap();
        assert_eq!(rec.quality, "720p");
    }

    #[test]
    fn rejects_bad_inputs_before_any_work() {
        let h = harness(FakeExtractor::default());
        for req in [
            DownloadRequest {
                trim_start: Some("1:xx".into()),
                ..request("u")
            },
            DownloadRequest {
                trim_start: Some("2:00".into()),
                trim_end: Some("1:00".into()),
                ..request("u")
            },
            DownloadRequest {
                download_type: Some("video".into()),
                quality: Some("ultra".into()),
                ..request("u")
            },
            DownloadRequest {
                download_type: Some("podcast".into()),
                ..request("u")
            },
        ] {
            let err = h.downloader.run(req).unwrap_err();
            assert!(matches!(err, DownloadError::Validation(_)), "{err:?}");
        }
        assert_eq!(h.extractor.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn audio_ignores_quality_label() {
        let h = harness(FakeExtractor::default());
        let out = h
            .downloader
            .run(DownloadRequest {
                quality: Some("whatever".into()),
                ..request("u")
            })
            .unwrap();
        let rec = h.catalog.get(&out.media_id).unwrap().unwrap();
        assert_eq!(rec.quality, "whatever");
    }

    #[test]
    fn reused_filename_gets_its_own_file() {
        let h = harness(FakeExtractor::default());
        let named = || DownloadRequest {
            filename: Some("same".into()),
            ..request("https://youtu.be/dQw4w9WgXcQ")
        };
        let first = h.downloader.run(named()).unwrap();
        let first_rec = h.catalog.get(&first.media_id).unwrap().unwrap();
        std::fs::write(&first_rec.path, b"first").unwrap();

        let second = h.downloader.run(named()).unwrap();
        let second_rec = h.catalog.get(&second.media_id).unwrap().unwrap();

        assert_eq!(first_rec.path.file_name().unwrap(), "same.mp3");
        assert_ne!(second_rec.path, first_rec.path);
        assert!(
            second_rec
                .path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("same_")
        );
        assert_eq!(std::fs::read(&first_rec.path).unwrap(), b"first");
        assert_eq!(h.catalog.list_all().unwrap().len(), 2);
    }

    #[test]
    fn no_metadata_leaves_no_thumbnail_behind() {
        let h = harness(FakeExtractor::default());
        let out = h
            .downloader
            .run(DownloadRequest {
                include_metadata: Some(false),
                ..request("u")
            })
            .unwrap();
        let plan = h.extractor.last_plan.lock().unwrap().clone().unwrap();
        assert!(!plan.steps.contains(&PostStep::WriteThumbnail));
        let rec = h.catalog.get(&out.media_id).unwrap().unwrap();
        assert!(!rec.path.with_extension("webp").exists());
    }
}
