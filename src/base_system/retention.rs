//! 后台保留期清理任务。
//!
//! 只按文件修改时间删除过期文件，不读取也不更新媒体库记录；
//! 因此被清理的文件在媒体库中会留下失效记录（访问时返回 404）。

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    dirs: Vec<PathBuf>,
    max_age: Duration,
    period: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    pub failed: usize,
}

impl RetentionSweeper {
    pub fn new(dirs: Vec<PathBuf>, max_age: Duration, period: Duration) -> Self {
        Self {
            dirs,
            max_age,
            period,
        }
    }

    /// One pass over every watched directory (non-recursive, files only).
    pub fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(e) => e,
                Err(e) => {
                    warn!(target: "retention", dir = %dir.display(), error = %e, "cannot list directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                report.scanned += 1;

                let Ok(modified) = meta.modified() else {
                    continue;
                };
                // mtime in the future (clock skew) counts as age zero
                let age = now.duration_since(modified).unwrap_or_default();
                if age <= self.max_age {
                    continue;
                }

                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!(target: "retention", path = %path.display(), age_secs = age.as_secs(), "Deleted old file");
                        report.deleted.push(path);
                    }
                    Err(e) => {
                        error!(target: "retention", path = %path.display(), error = %e, "Error deleting file");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Run forever on the tokio runtime until `token` is cancelled.
    /// The first sweep happens immediately.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                target: "retention",
                period_secs = self.period.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "retention sweeper started"
            );
            loop {
                let sweeper = self.clone();
                match tokio::task::spawn_blocking(move || sweeper.sweep_once(SystemTime::now())).await {
                    Ok(report) => {
                        debug!(
                            target: "retention",
                            scanned = report.scanned,
                            deleted = report.deleted.len(),
                            failed = report.failed,
                            "sweep finished"
                        );
                    }
                    Err(e) => error!(target: "retention", error = %e, "Error in cleanup task"),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.period) => {}
                }
            }
            info!(target: "retention", "retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweeper(dir: PathBuf, max_age: Duration) -> RetentionSweeper {
        RetentionSweeper::new(vec![dir], max_age, Duration::from_secs(3600))
    }

    #[test]
    fn deletes_only_files_older_than_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.mp3");
        let fresh = dir.path().join("fresh.mp3");
        fs::write(&old, b"old").unwrap();
        fs::write(&fresh, b"fresh").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let max_age = Duration::from_secs(24 * 3600);
        let old_mtime = fs::metadata(&old).unwrap().modified().unwrap();
        // pretend two days have passed for `old`, but judge `fresh` against real time
        let later = old_mtime + Duration::from_secs(48 * 3600);

        let s = sweeper(dir.path().to_path_buf(), max_age);
        let report = s.sweep_once(SystemTime::now());
        assert!(report.deleted.is_empty());
        assert_eq!(report.scanned, 2);

        fs::remove_file(&fresh).unwrap();
        let report = s.sweep_once(later);
        assert_eq!(report.deleted, vec![old.clone()]);
        assert!(!old.exists());
        assert!(dir.path().join("sub").exists());
    }

    #[test]
    fn missing_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let s = sweeper(dir.path().join("gone"), Duration::from_secs(1));
        assert_eq!(s.sweep_once(SystemTime::now()), SweepReport::default());
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let s = sweeper(dir.path().to_path_buf(), Duration::from_secs(60));
        let token = CancellationToken::new();
        let handle = s.spawn(token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
