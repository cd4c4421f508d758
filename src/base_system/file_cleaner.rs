//! 媒体目录与临时文件清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::{error, info};

/// 删除目录下的全部文件与子目录（目录本身保留）。
///
/// 单个条目删除失败只记录日志并继续；目录不存在视为已清空。
/// 返回成功删除的条目数。
pub fn purge_dir_contents(dir: impl AsRef<Path>) -> io::Result<usize> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let result = match entry.file_type() {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                error!(target: "retention", path = %path.display(), error = %e, "failed to delete");
            }
        }
    }

    if removed > 0 {
        info!(target: "retention", dir = %dir.display(), removed, "directory purged");
    }
    Ok(removed)
}

/// 删除单个文件；文件不存在时返回 `Ok(false)`。
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purges_files_and_subdirs_but_keeps_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), b"a").unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("nested/deeper/b.mp4"), b"b").unwrap();

        assert_eq!(purge_dir_contents(dir.path()).unwrap(), 2);
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        // second run is a no-op
        assert_eq!(purge_dir_contents(dir.path()).unwrap(), 0);
    }

    #[test]
    fn missing_dir_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(purge_dir_contents(dir.path().join("nope")).unwrap(), 0);
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.webp");
        assert!(!remove_file_if_exists(&p).unwrap());
        fs::write(&p, b"x").unwrap();
        assert!(remove_file_if_exists(&p).unwrap());
    }
}
