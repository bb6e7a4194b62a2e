//! Lexical path manipulation over `/`-separated strings.
//!
//! Build files always spell paths with forward slashes, and every computation here is purely
//! textual: nothing touches the filesystem except [`relative_path`], which needs the current
//! directory to anchor relative inputs.

use std::env;

use itertools::Itertools;

/// Collapse redundant separators and `.` components and resolve `..` lexically.
///
/// ```
/// use gypsum_util::path::normpath;
/// assert_eq!(normpath("a//b/./c/../d"), "a/b/d");
/// assert_eq!(normpath("../a/.."), "..");
/// assert_eq!(normpath(""), ".");
/// ```
pub fn normpath(path: &str) -> String {
    if path.is_empty() {
        return ".".into();
    }

    let absolute = path.starts_with('/');
    let mut components: Vec<&str> = vec![];
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if !absolute && (components.is_empty() || components.last() == Some(&"..")) {
                    components.push("..");
                } else {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }

    let joined = components.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".into(),
        (false, false) => joined,
    }
}

/// Everything before the final `/`, without trailing separators (unless that leaves the root).
pub fn dirname(path: &str) -> &str {
    let Some(idx) = path.rfind('/') else {
        return "";
    };

    let head = &path[..=idx];
    let trimmed = head.trim_end_matches('/');
    if trimmed.is_empty() {
        head
    } else {
        trimmed
    }
}

/// Join two path fragments. An absolute `tail` replaces `head` entirely.
pub fn join(head: &str, tail: &str) -> String {
    if tail.starts_with('/') || head.is_empty() {
        tail.to_string()
    } else if head.ends_with('/') {
        format!("{head}{tail}")
    } else {
        format!("{head}/{tail}")
    }
}

/// Split off the extension of the final path component, keeping the dot on the extension.
/// Leading dots of the file name do not start an extension.
pub fn split_ext(path: &str) -> (&str, &str) {
    let sep = path.rfind('/').map_or(0, |i| i + 1);
    match path.rfind('.') {
        Some(dot) if dot > sep && path[sep..dot].chars().any(|c| c != '.') => {
            (&path[..dot], &path[dot..])
        }
        _ => (path, ""),
    }
}

fn absolute_components(path: &str) -> Vec<String> {
    let path = if path.is_empty() { "." } else { path };
    let absolute = if path.starts_with('/') {
        normpath(path)
    } else {
        let cwd = env::current_dir()
            .map(|d| d.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| "/".into());
        normpath(&join(&cwd, path))
    };

    absolute
        .split('/')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// Express `path` relative to the directory `relative_to`.
///
/// Both arguments are anchored at the current directory when relative. Identical inputs
/// produce the empty string.
///
/// ```
/// use gypsum_util::path::relative_path;
/// assert_eq!(relative_path("/src/base/a.c", "/src/net"), "../base/a.c");
/// assert_eq!(relative_path("/src", "/src"), "");
/// ```
pub fn relative_path(path: &str, relative_to: &str) -> String {
    let path_split = absolute_components(path);
    let relative_to_split = absolute_components(relative_to);

    let prefix_len = path_split
        .iter()
        .zip(relative_to_split.iter())
        .take_while(|(a, b)| a == b)
        .count();

    std::iter::repeat("..")
        .take(relative_to_split.len() - prefix_len)
        .chain(path_split[prefix_len..].iter().map(String::as_str))
        .join("/")
}
