//! 远程封面等小文件的阻塞式下载。

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue};
use tracing::debug;

pub(crate) fn fetch_bytes(url: &str, timeout: Duration) -> Option<Vec<u8>> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return None;
    }

    // reqwest in this project is built without default features (no gzip decoder).
    // Request identity encoding so the returned bytes are directly usable.
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("image/*,*/*;q=0.8"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .ok()?;

    let resp = client.get(url).send().ok()?;
    let resp = resp.error_for_status().ok()?;
    let bytes = resp.bytes().ok()?;
    if bytes.is_empty() {
        return None;
    }
    debug!(target: "tagging", url, len = bytes.len(), "remote thumbnail fetched");
    Some(bytes.to_vec())
}

/// Download `url` into `dir/<stem>.<ext>`, keeping the image extension from
/// the URL path when it has a known one.
pub(crate) fn fetch_to_dir(url: &str, dir: &Path, stem: &str, timeout: Duration) -> Option<PathBuf> {
    let bytes = fetch_bytes(url, timeout)?;
    let target = dir.join(format!("{stem}.{}", image_ext_from_url(url)));
    std::fs::write(&target, bytes).ok()?;
    Some(target)
}

fn image_ext_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let ext = path
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webp" => "webp",
        "png" => "png",
        _ => "jpg",
    }
}
