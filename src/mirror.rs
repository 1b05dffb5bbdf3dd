//! Mirror filesystem layout: deterministic URL-to-path mapping and artifact
//! writes under `<mirror_root>/<host>/<cleaned-path>`.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("URL has no host: {0}")]
    NoHost(String),

    #[error("Disk error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive the mirror path for a URL.
///
/// The mapping is a pure function of (URL, HTML-ness): identical inputs always
/// produce identical paths. The URL path is percent-decoded so Unicode
/// segments land literally on disk; the query string never appears.
pub fn mirror_path(mirror_root: &Path, url: &Url, html: bool) -> Result<PathBuf, MirrorError> {
    let host = url
        .host_str()
        .ok_or_else(|| MirrorError::NoHost(url.to_string()))?;

    let raw_path = match url.path() {
        "" => "/",
        p => p,
    };
    let mut file_path = percent_decode_str(raw_path)
        .decode_utf8_lossy()
        .into_owned();

    if html {
        if file_path.ends_with('/') {
            file_path.push_str("index.html");
        } else if !file_path.ends_with(".html") && !file_path.ends_with(".htm") {
            file_path.push_str(".html");
        }
    }

    let cleaned = clean_path(&file_path);

    Ok(mirror_root.join(host).join(cleaned))
}

/// Lexically normalize a slash-separated path: collapse `.` and empty
/// segments, resolve `..` without ever escaping the root, and strip
/// characters unusable on POSIX filesystems (NUL and ASCII controls).
fn clean_path(path: &str) -> PathBuf {
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => {
                let sanitized: String = other.chars().filter(|c| !c.is_control()).collect();
                if !sanitized.is_empty() {
                    segments.push(sanitized);
                }
            }
        }
    }

    segments.iter().collect()
}

/// Write a response body to its mirror location.
///
/// Parent directories are created 0755, the file is written 0644. Rewrites of
/// identical bytes are harmless, which is what makes duplicate fetches safe.
pub async fn write_artifact(
    mirror_root: &Path,
    url: &Url,
    html: bool,
    body: &[u8],
) -> Result<PathBuf, MirrorError> {
    let path = mirror_path(mirror_root, url, html)?;

    if let Some(parent) = path.parent() {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(parent).await?;
    }

    tokio::fs::write(&path, body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await?;
    }

    Ok(path)
}
