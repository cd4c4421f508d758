//! 转码工具（ffmpeg）可用性检查与子进程调用。

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

pub const FFMPEG_REMEDIATION: &str = "Could not find a working FFmpeg. Please install it manually from https://ffmpeg.org/ or point `ffmpeg_path` in config.yml at the binary.";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("{bin} is not available: {reason}")]
    Missing { bin: String, reason: String },
    #[error("{bin} exited with {code:?}: {stderr}")]
    Failed {
        bin: String,
        code: Option<i32>,
        stderr: String,
    },
}

pub trait Transcoder: Send + Sync {
    /// Fails when the binary cannot be executed.
    fn ensure_available(&self) -> Result<(), ToolchainError>;

    /// Explicit location to hand to other tools, `None` when it is resolved
    /// through `PATH`.
    fn location(&self) -> Option<PathBuf>;

    fn run(&self, args: &[String]) -> Result<(), ToolchainError>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    bin: PathBuf,
}

impl Ffmpeg {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    fn name(&self) -> String {
        self.bin.display().to_string()
    }
}

impl Transcoder for Ffmpeg {
    fn ensure_available(&self) -> Result<(), ToolchainError> {
        let out = Command::new(&self.bin)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ToolchainError::Missing {
                bin: self.name(),
                reason: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(ToolchainError::Missing {
                bin: self.name(),
                reason: format!("`-version` exited with {:?}", out.status.code()),
            });
        }
        let banner = String::from_utf8_lossy(&out.stdout);
        debug!(
            target: "tagging",
            version = banner.lines().next().unwrap_or(""),
            "ffmpeg available"
        );
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        is_explicit_path(&self.bin).then(|| self.bin.clone())
    }

    fn run(&self, args: &[String]) -> Result<(), ToolchainError> {
        info!(target: "tagging", bin = %self.name(), "running ffmpeg");
        let out = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ToolchainError::Missing {
                bin: self.name(),
                reason: e.to_string(),
            })?;
        if !out.status.success() {
            return Err(ToolchainError::Failed {
                bin: self.name(),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

// A bare name like `ffmpeg` is looked up on PATH by every tool; anything with
// a directory component must be passed along explicitly.
fn is_explicit_path(bin: &Path) -> bool {
    bin.components().count() > 1 || bin.is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_has_no_location() {
        assert!(Ffmpeg::new("ffmpeg").location().is_none());
        assert_eq!(
            Ffmpeg::new("/opt/ffmpeg/bin/ffmpeg").location(),
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert!(Ffmpeg::new("./tools/ffmpeg").location().is_some());
    }

    #[test]
    fn missing_binary_is_reported() {
        let err = Ffmpeg::new("/definitely/not/here/ffmpeg")
            .ensure_available()
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Missing { .. }));
    }
}
