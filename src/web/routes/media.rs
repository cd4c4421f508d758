//! 媒体文件读取：在线播放（支持 Range）与强制下载。

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::catalog::MediaRecord;
use crate::web::error::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ByteRange {
    /// Header absent, malformed or multi-range: serve the whole file.
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interpret a `Range` header against a file of `size` bytes. Only a single
/// `bytes=` range is honoured; `end` is inclusive and clamped to the file.
pub(crate) fn parse_range(raw: &str, size: u64) -> ByteRange {
    let Some(spec) = raw.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start_s, end_s)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (start_s, end_s) = (start_s.trim(), end_s.trim());

    if start_s.is_empty() {
        // suffix form: the last N bytes
        let Ok(n) = end_s.parse::<u64>() else {
            return ByteRange::Full;
        };
        if n == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial {
            start: size.saturating_sub(n),
            end: size - 1,
        };
    }

    let Ok(start) = start_s.parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    let end = if end_s.is_empty() {
        size - 1
    } else {
        match end_s.parse::<u64>() {
            Ok(e) if e >= start => e.min(size - 1),
            _ => return ByteRange::Full,
        }
    };
    ByteRange::Partial { start, end }
}

fn make_content_disposition(filename: &str) -> Option<HeaderValue> {
    // RFC 5987 filename* for UTF-8 names, plus ASCII fallback for legacy clients.
    fn is_unreserved(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_')
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for &b in filename.as_bytes() {
        if is_unreserved(b) {
            encoded.push(char::from(b));
        } else {
            encoded.push('%');
            encoded.push_str(&format!("{b:02X}"));
        }
    }

    let ascii_fallback = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let value = format!("attachment; filename=\"{ascii_fallback}\"; filename*=UTF-8''{encoded}");
    HeaderValue::from_str(&value).ok()
}

/// Look up the record and make sure its file is still on disk.
async fn locate(state: &AppState, id: String) -> Result<(MediaRecord, PathBuf, u64), ApiError> {
    let catalog = state.catalog.clone();
    let record = tokio::task::spawn_blocking(move || catalog.get(&id))
        .await??
        .ok_or_else(|| ApiError::not_found("Media not found"))?;
    let path = record.file_path().to_path_buf();
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if !meta.is_file() {
        return Err(ApiError::not_found("File not found"));
    }
    Ok((record, path, meta.len()))
}

async fn open_body(path: &Path, start: u64, len: u64) -> Result<Body, ApiError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    }
    Ok(Body::from_stream(ReaderStream::new(file.take(len))))
}

pub(crate) async fn stream_media(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (record, path, size) = locate(&state, id).await?;
    let mime = HeaderValue::from_static(record.mime_type());

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|raw| parse_range(raw, size))
        .unwrap_or(ByteRange::Full);

    let mut resp = match range {
        ByteRange::Unsatisfiable => {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(v) = HeaderValue::from_str(&format!("bytes */{size}")) {
                resp.headers_mut().insert(header::CONTENT_RANGE, v);
            }
            resp
        }
        ByteRange::Full => {
            let mut resp = Response::new(open_body(&path, 0, size).await?);
            resp.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            resp
        }
        ByteRange::Partial { start, end } => {
            let len = end - start + 1;
            let mut resp = Response::new(open_body(&path, start, len).await?);
            *resp.status_mut() = StatusCode::PARTIAL_CONTENT;
            let h = resp.headers_mut();
            h.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            if let Ok(v) = HeaderValue::from_str(&format!("bytes {start}-{end}/{size}")) {
                h.insert(header::CONTENT_RANGE, v);
            }
            resp
        }
    };

    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, mime);
    h.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok(resp)
}

pub(crate) async fn download_media(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Response, ApiError> {
    let (record, path, size) = locate(&state, id).await?;

    let mut resp = Response::new(open_body(&path, 0, size).await?);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static(record.mime_type()));
    h.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    h.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, post-check=0, pre-check=0"),
    );
    h.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    h.insert(header::EXPIRES, HeaderValue::from_static("0"));

    let name = format!("{}.{}", record.title, record.extension());
    if let Some(hv) = make_content_disposition(&name) {
        h.insert(header::CONTENT_DISPOSITION, hv);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_and_open_ranges() {
        assert_eq!(parse_range("bytes=0-99", 1000), ByteRange::Partial { start: 0, end: 99 });
        assert_eq!(parse_range("bytes=500-", 1000), ByteRange::Partial { start: 500, end: 999 });
        assert_eq!(parse_range("bytes=900-5000", 1000), ByteRange::Partial { start: 900, end: 999 });
    }

    #[test]
    fn suffix_ranges() {
        assert_eq!(parse_range("bytes=-100", 1000), ByteRange::Partial { start: 900, end: 999 });
        assert_eq!(parse_range("bytes=-5000", 1000), ByteRange::Partial { start: 0, end: 999 });
        assert_eq!(parse_range("bytes=-0", 1000), ByteRange::Unsatisfiable);
    }

    #[test]
    fn unsatisfiable_and_ignored() {
        assert_eq!(parse_range("bytes=1000-", 1000), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1", 0), ByteRange::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1,5-9", 1000), ByteRange::Full);
        assert_eq!(parse_range("items=0-1", 1000), ByteRange::Full);
        assert_eq!(parse_range("bytes=abc-", 1000), ByteRange::Full);
        assert_eq!(parse_range("bytes=50-10", 1000), ByteRange::Full);
    }

    #[test]
    fn content_disposition_keeps_utf8_name() {
        let hv = make_content_disposition("夜に駆ける.mp3").unwrap();
        let s = hv.to_str().unwrap();
        assert!(s.starts_with("attachment; filename=\"_____.mp3\""));
        assert!(s.contains("filename*=UTF-8''%E5%A4%9C"));
    }
}
