//! Shared utility functions used across multiple modules.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Join a remote prefix and a relative path into an object key.
///
/// Always uses `/` separators regardless of platform and never produces
/// doubled slashes.
pub fn remote_key(prefix: &str, relative_path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let rel = relative_path.trim_start_matches('/').replace('\\', "/");
    if prefix.is_empty() {
        rel
    } else {
        format!("{prefix}/{rel}")
    }
}

/// Compute the path of a file relative to a folder root as a `/`-separated
/// string key suitable for the database and the remote store.
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        Error::InvalidInput(format!(
            "path {} is outside folder root {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Resolve a relative key back into an absolute path under the folder root.
pub fn local_path(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn remote_key_avoids_doubled_slashes() {
        assert_eq!(remote_key("backups/", "/a/b.txt"), "backups/a/b.txt");
        assert_eq!(remote_key("backups", "a/b.txt"), "backups/a/b.txt");
        assert_eq!(remote_key("", "a.txt"), "a.txt");
    }

    #[test]
    fn relative_key_uses_forward_slashes() {
        let root = Path::new("/tmp/folder");
        let path = Path::new("/tmp/folder/sub/file.txt");
        assert_eq!(relative_key(root, path).unwrap(), "sub/file.txt");
    }

    #[test]
    fn relative_key_rejects_outside_paths() {
        let root = Path::new("/tmp/folder");
        assert!(relative_key(root, Path::new("/tmp/other/file.txt")).is_err());
    }

    #[test]
    fn local_path_round_trips() {
        let root = Path::new("/tmp/folder");
        assert_eq!(
            local_path(root, "sub/file.txt"),
            PathBuf::from("/tmp/folder/sub/file.txt")
        );
    }
}
