//! Remote path utilities for SFTP operations
//!
//! Remote SFTP paths always use `/` as separator, regardless of the local OS.

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Parent directory of a remote path.
///
/// Returns `"/"` for top-level absolute paths and `""` for bare relative names.
pub fn parent_remote_path(path: &str) -> &str {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Every ancestor directory of `remote_file`, root to leaf.
///
/// `/a/b/c.txt` yields `["/a", "/a/b"]`; `x/y/f` yields `["x", "x/y"]`.
/// The root itself, empty segments and `.` are skipped.
pub fn ancestor_dirs(remote_file: &str) -> Vec<String> {
    let parent = parent_remote_path(remote_file);
    let mut current = if is_absolute_remote_path(parent) {
        "/".to_string()
    } else {
        String::new()
    };

    let mut dirs = Vec::new();
    for segment in parent.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        current = join_remote_path(&current, segment);
        dirs.push(current.clone());
    }
    dirs
}
