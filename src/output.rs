//! Result types returned by the conversion entry points.

use crate::error::{PageError, Pdf2EpubError};
use serde::{Deserialize, Serialize};

/// Everything a finished conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The serialised archive, ready to be saved.
    pub archive: OutputArchive,
    /// One entry per selected page, in page order.
    pub pages: Vec<PageResult>,
    /// Metadata read from the source document.
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Turn an isolated-failure run into an error if any page failed.
    ///
    /// Useful when the `Isolate` policy is used for progress reporting but
    /// the caller still refuses incomplete books.
    pub fn into_result(self) -> Result<Self, Pdf2EpubError> {
        if let Some(err) = self.pages.iter().find_map(|p| p.error.clone()) {
            return Err(err.into());
        }
        Ok(self)
    }
}

/// The final serialised container.
///
/// Created once after every page has been processed; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArchive {
    /// Derived download name, `<source-base-name>.<ext>`.
    pub file_name: String,
    /// MIME type of `bytes`.
    pub media_type: String,
    /// Archive members in write order.
    pub members: Vec<String>,
    /// Package identifier written into the archive, if any.
    pub identifier: Option<String>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl OutputArchive {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Outcome for one source page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed source page number.
    pub page_num: usize,
    /// Package identifier, `page_<n>`.
    pub id: String,
    /// Characters of extracted text (text mode).
    pub text_chars: usize,
    /// Rendered image size in pixels (image mode).
    pub image_size: Option<(u32, u32)>,
    pub duration_ms: u64,
    /// Set when the page failed under the `Isolate` policy.
    pub error: Option<PageError>,
}

/// Document information read by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Timing and counts for a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Selected pages extracted without error.
    pub processed_pages: usize,
    /// Selected pages replaced by placeholders.
    pub failed_pages: usize,
    /// Pages not selected.
    pub skipped_pages: usize,
    pub archive_bytes: usize,
    pub total_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub package_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with(errors: Vec<Option<PageError>>) -> ConversionOutput {
        ConversionOutput {
            archive: OutputArchive {
                file_name: "a.epub".into(),
                media_type: "application/epub+zip".into(),
                members: vec!["mimetype".into()],
                identifier: None,
                bytes: vec![1, 2, 3],
            },
            pages: errors
                .into_iter()
                .enumerate()
                .map(|(i, error)| PageResult {
                    page_num: i + 1,
                    id: format!("page_{}", i + 1),
                    text_chars: 0,
                    image_size: None,
                    duration_ms: 0,
                    error,
                })
                .collect(),
            metadata: DocumentMetadata::default(),
            stats: ConversionStats::default(),
        }
    }

    #[test]
    fn into_result_passes_clean_output() {
        assert!(output_with(vec![None, None]).into_result().is_ok());
    }

    #[test]
    fn into_result_surfaces_first_page_error() {
        let out = output_with(vec![
            None,
            Some(PageError::TextFailed {
                page: 2,
                detail: "boom".into(),
            }),
        ]);
        let err = out.into_result().unwrap_err();
        assert!(err.is_extraction_error());
        assert!(err.to_string().contains("page 2"));
    }

    #[test]
    fn archive_bytes_skipped_in_json() {
        let out = output_with(vec![None]);
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"file_name\":\"a.epub\""));
        assert!(!json.contains("\"bytes\""));
    }
}
