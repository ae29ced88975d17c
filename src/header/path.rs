//! Archive-relative path splitting and normalization

use std::path::{Component, Path, PathBuf};

/// Split a path into archive path segments relative to `root`.
///
/// Absolute paths under `root` are stripped down to their relative part;
/// paths already relative are taken as root-relative. `.` segments refer to
/// the root and are skipped. An empty result addresses the root itself.
pub fn split_archive_path(root: &Path, path: &Path) -> Vec<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Resolve `.` and `..` segments lexically, without touching the filesystem.
///
/// Used on already-canonicalized bases joined with a raw symlink target, so
/// the result is comparable against the canonical archive root.
pub fn lexical_resolve(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push("..");
                }
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Join archive path segments into the `/`-separated display form used by
/// listings and link targets.
pub fn join_display(segments: &[String]) -> String {
    segments.join("/")
}
