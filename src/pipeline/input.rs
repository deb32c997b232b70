//! Input resolution: turn a path or URL into a local, validated PDF.
//!
//! ## Why download to a temp file?
//!
//! pdfium opens documents from the file system. A downloaded report is
//! written into a `TempDir` that lives as long as the [`ResolvedInput`], so it
//! is removed on every exit path. The raw bytes are read once here: they are
//! checked for the `%PDF` magic and hashed into the document fingerprint.

use crate::document::fingerprint;
use crate::error::SummaryError;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// A PDF ready for loading.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    /// BLAKE3 fingerprint of the file's bytes.
    pub fingerprint: String,
    /// Size of the file in bytes.
    pub size: u64,
    _temp_dir: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the PDF was fetched from a URL.
    pub fn is_downloaded(&self) -> bool {
        self._temp_dir.is_some()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to a validated local PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, SummaryError> {
    if input.trim().is_empty() {
        return Err(SummaryError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).await
    }
}

async fn resolve_local(path: &Path) -> Result<ResolvedInput, SummaryError> {
    let path = path.to_path_buf();
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(SummaryError::PermissionDenied { path })
        }
        Err(_) => return Err(SummaryError::FileNotFound { path }),
    };
    check_magic(&path, &bytes)?;
    debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput {
        fingerprint: fingerprint(&bytes),
        size: bytes.len() as u64,
        path,
        _temp_dir: None,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, SummaryError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| SummaryError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let timed_out = || SummaryError::DownloadTimeout {
        url: url.to_string(),
        secs: timeout_secs,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            timed_out()
        } else {
            failed(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            timed_out()
        } else {
            failed(e.to_string())
        }
    })?;

    let temp_dir = TempDir::new().map_err(|e| SummaryError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));
    check_magic(&path, &bytes)?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| SummaryError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput {
        fingerprint: fingerprint(&bytes),
        size: bytes.len() as u64,
        path,
        _temp_dir: Some(temp_dir),
    })
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), SummaryError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(SummaryError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Last URL path segment when it looks like a file name, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/r/board-q3.pdf"), "board-q3.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn local_pdf_resolves_with_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.pdf");
        std::fs::write(&path, b"%PDF-1.7\n...").unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), path.as_path());
        assert_eq!(resolved.fingerprint, fingerprint(b"%PDF-1.7\n..."));
        assert!(!resolved.is_downloaded());
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = resolve_input("/no/such/report.pdf", 5).await.unwrap_err();
        assert!(matches!(err, SummaryError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        let err = resolve_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, SummaryError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, SummaryError::InvalidInput { .. }));
    }
}
