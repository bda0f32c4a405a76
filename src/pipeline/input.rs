//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium loads from a byte slice, so a URL is downloaded straight into
//! memory; no temp file is involved. Magic-byte validation happens later in
//! [`crate::pipeline::load`] so the same check covers every entry point.

use crate::error::Pdf2EpubError;
use std::path::Path;
use tracing::{debug, info};

/// Fallback name when a URL path has no usable last segment.
const DOWNLOADED_NAME: &str = "downloaded.pdf";

/// Raw source bytes plus the name used for titles and output paths.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub bytes: Vec<u8>,
    /// Final path component, e.g. `report.pdf`.
    pub file_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `input` from disk, or download it if it is an http(s) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceInput, Pdf2EpubError> {
    if input.trim().is_empty() {
        return Err(Pdf2EpubError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Final path component of `path`, or `fallback`.
pub fn file_name_of(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

async fn read_local(path: &Path) -> Result<SourceInput, Pdf2EpubError> {
    if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(Pdf2EpubError::InvalidInput {
            input: path.display().to_string(),
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2EpubError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2EpubError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceInput {
        bytes,
        file_name: file_name_of(path, DOWNLOADED_NAME),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceInput, Pdf2EpubError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2EpubError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2EpubError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2EpubError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(Pdf2EpubError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(SourceInput {
        bytes: bytes.to_vec(),
        file_name: filename_from_url(url),
    })
}

/// Last path segment of a URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    DOWNLOADED_NAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.org/papers/a.pdf"), "a.pdf");
        assert_eq!(filename_from_url("https://x.org/papers/"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/get?id=3"), "downloaded.pdf");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(Path::new("/tmp/book.pdf"), "x"), "book.pdf");
        assert_eq!(file_name_of(Path::new("/"), "x"), "x");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2EpubError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_blank_input() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2EpubError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();

        let input = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.file_name, "notes.pdf");
        assert_eq!(input.bytes, b"%PDF-1.4\n");
    }
}
