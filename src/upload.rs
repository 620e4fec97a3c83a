//! Folder uploader.
//!
//! Walks a local directory and uploads every file to the bucket, keyed by its
//! path relative to the directory (with `/` separators), optionally under a
//! key prefix. The usual layout mirrors the bucket:
//!
//! ```text
//! scans/
//! └── dbhack-untels/
//!     ├── 2015/2015100234.jpg
//!     └── 2017/1720300112.jpg
//! ```
//!
//! A file that fails to upload is logged and counted; the walk carries on.

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::UploadConfig;
use crate::storage::ObjectStore;

/// Outcome of an upload run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Files filtered out by the include/exclude globs.
    pub skipped: usize,
}

/// Upload every file under `root`.
pub async fn upload_dir(
    store: &dyn ObjectStore,
    root: &Path,
    key_prefix: Option<&str>,
    upload: &UploadConfig,
) -> Result<UploadReport> {
    if !root.is_dir() {
        bail!("Upload root is not a directory: {}", root.display());
    }

    let include_set = build_globset(&upload.include_globs)?;
    let exclude_set = build_globset(&upload.exclude_globs)?;
    let prefix = key_prefix
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty());

    let mut report = UploadReport::default();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "failed to read directory entry");
                report.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_key) || !include_set.is_match(&rel_key) {
            report.skipped += 1;
            continue;
        }

        let key = match prefix {
            Some(p) => format!("{}/{}", p, rel_key),
            None => rel_key,
        };

        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                report.failed += 1;
                continue;
            }
        };

        match store.put_object(&key, body, content_type_for(&key)).await {
            Ok(()) => {
                info!(key = %key, "uploaded");
                report.uploaded += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %format!("{:#}", e), "upload failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// MIME type for a scanned record, from its file extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Patterns match case-insensitively: scans arrive as both `.jpg` and `.JPG`.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
