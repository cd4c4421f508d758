use thiserror::Error;

use crate::catalog::CatalogError;

/// Generic text shown for any failure of the external fetch.
pub const UPSTREAM_SUMMARY: &str =
    "Failed to download video. The platform may have blocked the request.";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("Failed to download video. The platform may have blocked the request.")]
    Upstream { message: String },
    #[error("download io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl DownloadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DownloadError::Validation(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        DownloadError::Upstream {
            message: msg.into(),
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            DownloadError::Validation(_) => 400,
            _ => 500,
        }
    }
}
