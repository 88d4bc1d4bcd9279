use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Modification time, or the epoch if the path is gone.
pub fn safe_mtime(path: &Path) -> SystemTime {
    path.metadata()
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Latest modification time across files and folders, recursing into
/// folders. Missing paths and symlinks count as the epoch.
pub fn latest_mtime<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> SystemTime {
    paths
        .into_iter()
        .map(|p| tree_mtime(p.as_ref()))
        .max()
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn tree_mtime(path: &Path) -> SystemTime {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.path_is_symlink())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Size of a file, or total size of a folder like `du`. Symlinks and
/// missing paths are 0.
pub fn disk_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.path_is_symlink())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
