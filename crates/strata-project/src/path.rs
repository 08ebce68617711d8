//! Project-relative path helpers
//!
//! Paths inside a project are plain strings joined with `/`. Anything that
//! tries to climb out of the project root with `..` is rejected rather than
//! resolved.

use crate::error::{Error, Result};

pub const SEPARATOR: char = '/';

/// Normalize a path: collapse repeated separators, drop `.` segments and
/// reject `..` segments. A leading `/` is preserved.
pub fn normalize(path: &str) -> Result<String> {
    let absolute = path.starts_with(SEPARATOR);
    let mut segments = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::config(format!(
                    "path {:?} escapes the project root",
                    path
                )))
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if absolute {
        Ok(format!("/{}", joined))
    } else {
        Ok(joined)
    }
}

/// Join path parts, skipping parts that normalize to nothing
pub fn join(parts: &[&str]) -> Result<String> {
    let mut normalized = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let part = normalize(part)?;
        if part.is_empty() {
            continue;
        }
        // Only the first part may carry the root separator.
        if i > 0 && part.starts_with(SEPARATOR) {
            normalized.push(part.trim_start_matches(SEPARATOR).to_string());
        } else {
            normalized.push(part);
        }
    }
    Ok(normalized.join("/"))
}

/// Remove `prefix` and one following separator from the head of `path`.
///
/// Returns `path` unchanged when `prefix` is not a literal prefix of it.
pub fn strip_prefix<'a>(prefix: &str, path: &'a str) -> &'a str {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.strip_prefix(SEPARATOR).unwrap_or(rest),
        None => path,
    }
}

/// Whether `path` is `dir` itself or lies below it, segment-wise
pub fn is_within(dir: &str, path: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Every proper ancestor directory of `path`, shallowest first
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices(SEPARATOR)
        .map(|(i, _)| &path[..i])
        .filter(|dir| !dir.is_empty())
        .collect()
}
