// src/utils/url.rs

//! URL manipulation utilities.

use std::path::{Component, Path, PathBuf};

/// Derive the local relative path for a media URL.
///
/// Scheme, host, query and fragment are dropped, the leading separator is
/// stripped and the remaining segments are joined with the host separator.
/// `.` and `..` segments are discarded so the result never escapes its root.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use content_sync::utils::url::local_path_for_url;
///
/// assert_eq!(
///     local_path_for_url("https://cdn.example.com/img/a.png"),
///     PathBuf::from("img").join("a.png")
/// );
/// ```
pub fn local_path_for_url(url: &str) -> PathBuf {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => strip_scheme_and_host(url).to_string(),
    };
    relative_path(&path)
}

/// Fallback for strings `url` cannot parse (relative references and such).
fn strip_scheme_and_host(url: &str) -> &str {
    let without_scheme = match url.find("://") {
        Some(idx) => {
            let after = &url[idx + 3..];
            after.find('/').map_or("", |slash| &after[slash..])
        }
        None => url,
    };
    without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme)
}

/// Split a `/`-separated path into a relative host path.
pub fn relative_path(path: &str) -> PathBuf {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect()
}

/// Join `relative` onto `root`, refusing anything that would leave `root`.
pub fn join_within(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(joined)
}
