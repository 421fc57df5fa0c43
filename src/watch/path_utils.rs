// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// Unify separators to `/` and lexically clean a path string.
///
/// `//` collapses, `.` components drop out, `..` resolves against the
/// preceding component and a trailing separator is stripped. An empty input
/// stays empty; anything else that cleans down to nothing becomes `.`.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let unified = path.replace('\\', "/");
    let rooted = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// True when `s` ends in either separator.
pub fn ends_with_separator(s: &str) -> bool {
    s.ends_with('/') || s.ends_with('\\')
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if `path` is not below `root`. The root itself maps to an
/// empty string.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Render a path with forward slashes regardless of platform.
pub fn slash_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
