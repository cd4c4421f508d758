//! 存储卷容量统计。

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::warn;

use super::models::StorageUsage;

/// Total/used/free bytes of the volume that holds `root`.
///
/// Picks the disk with the longest mount point that prefixes `root`.
/// Returns zeros (and logs) when no disk matches.
pub fn storage_usage(root: &Path) -> StorageUsage {
    let target = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    let mounts = disks.list().iter().map(|d| {
        (
            PathBuf::from(d.mount_point()),
            d.total_space(),
            d.available_space(),
        )
    });

    match pick_volume(&target, mounts) {
        Some((total, free)) => StorageUsage {
            total,
            used: total.saturating_sub(free),
            free,
        },
        None => {
            warn!(target: "catalog", root = %target.display(), "could not determine storage volume");
            StorageUsage::default()
        }
    }
}

fn pick_volume(
    target: &Path,
    mounts: impl IntoIterator<Item = (PathBuf, u64, u64)>,
) -> Option<(u64, u64)> {
    mounts
        .into_iter()
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(_, total, free)| (total, free))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_mount_prefix_wins() {
        let mounts = vec![
            (PathBuf::from("/"), 100, 40),
            (PathBuf::from("/srv"), 500, 200),
            (PathBuf::from("/srv/other"), 10, 1),
        ];
        assert_eq!(
            pick_volume(Path::new("/srv/vault/downloads"), mounts.clone()),
            Some((500, 200))
        );
        assert_eq!(pick_volume(Path::new("/home/u"), mounts), Some((100, 40)));
    }

    #[test]
    fn no_matching_mount() {
        let mounts = vec![(PathBuf::from("/data"), 1, 1)];
        assert_eq!(pick_volume(Path::new("/srv"), mounts), None);
    }
}
