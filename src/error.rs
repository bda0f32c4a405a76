//! Error types for the edgequake-pdf2epub library.
//!
//! Fatal errors and per-page errors are kept apart:
//!
//! * [`Pdf2EpubError`] is fatal: the conversion cannot proceed at all
//!   (bad input file, wrong password, a page failed under the default
//!   abort policy). Returned as `Err(Pdf2EpubError)` from the top-level
//!   `convert*` functions. No archive is produced.
//!
//! * [`PageError`]: a single page could not be read. Under
//!   [`crate::config::PageFailurePolicy::Abort`] it is promoted to
//!   [`Pdf2EpubError::ExtractionFailed`]; under
//!   [`crate::config::PageFailurePolicy::Isolate`] it is stored inside
//!   [`crate::output::PageResult`] and the page gets a placeholder body.
//!
//! [`Pdf2EpubError::kind`] folds the variants into coarse categories so a UI
//! can tell a load failure from an extraction failure without matching on
//! every variant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Any error that stops a conversion without producing an archive.
#[derive(Debug, Error)]
pub enum Pdf2EpubError {
    // ── Source ────────────────────────────────────────────────────────────
    #[error("no such file: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("cannot read '{path}': permission denied")]
    PermissionDenied { path: PathBuf },

    /// Blank input, a directory, or something that is neither a path nor an
    /// http(s) URL.
    #[error("'{input}' is neither a readable file nor an http(s) URL")]
    InvalidInput { input: String },

    #[error("download of '{url}' failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("download of '{url}' gave up after {secs}s (see --download-timeout)")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document ──────────────────────────────────────────────────────────
    /// Rejected before pdfium is involved: empty, or no `%PDF-` header.
    #[error("'{name}' does not look like a PDF (starts with {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    #[error("'{name}' could not be parsed as a PDF: {detail}")]
    CorruptPdf { name: String, detail: String },

    #[error("'{name}' is encrypted; pass its password with --password")]
    PasswordRequired { name: String },

    #[error("the password for '{name}' was rejected")]
    WrongPassword { name: String },

    #[error("'{name}' contains no pages")]
    EmptyDocument { name: String },

    /// `page` is 0 when the selection matched no page at all.
    #[error("page selection {page} is outside 1..={total}")]
    PageOutOfRange { page: usize, total: usize },

    // ── Pages ─────────────────────────────────────────────────────────────
    /// First page failure under [`crate::config::PageFailurePolicy::Abort`].
    #[error("page {page} could not be extracted: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    #[error("none of the {total} selected pages could be extracted (first: {first_error})")]
    AllPagesFailed { total: usize, first_error: String },

    // ── Archive ───────────────────────────────────────────────────────────
    #[error("could not write archive member '{member}': {detail}")]
    PackagingFailed { member: String, detail: String },

    #[error("could not write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Setup ─────────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The pdfium shared library was not found in `PDFIUM_LIB_PATH`, the
    /// working directory, or on the system library path.
    #[error(
        "pdfium is not available: {0}\n\
         Point PDFIUM_LIB_PATH at libpdfium (file or directory), or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Stopped through [`crate::stream::ConversionTask::cancel`].
    #[error("cancelled after {completed} of {total} pages")]
    Cancelled { completed: usize, total: usize },

    /// A blocking worker panicked or a runtime could not be created.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse category of a [`Pdf2EpubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The input could not be located, read or downloaded.
    Input,
    /// The buffer is not a usable document.
    Load,
    /// A page could not be read.
    Extraction,
    /// The archive could not be assembled.
    Packaging,
    /// The finished archive could not be written.
    Output,
    /// Settings were inconsistent, or the page selection matched nothing.
    Config,
    /// The PDF engine is unavailable.
    Engine,
    Cancelled,
    Internal,
}

impl Pdf2EpubError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidInput { .. }
            | Self::DownloadFailed { .. }
            | Self::DownloadTimeout { .. } => ErrorKind::Input,
            Self::NotAPdf { .. }
            | Self::CorruptPdf { .. }
            | Self::PasswordRequired { .. }
            | Self::WrongPassword { .. }
            | Self::EmptyDocument { .. } => ErrorKind::Load,
            Self::ExtractionFailed { .. } | Self::AllPagesFailed { .. } => ErrorKind::Extraction,
            Self::PackagingFailed { .. } => ErrorKind::Packaging,
            Self::OutputWriteFailed { .. } => ErrorKind::Output,
            Self::InvalidConfig(_) | Self::PageOutOfRange { .. } => ErrorKind::Config,
            Self::PdfiumBindingFailed(_) => ErrorKind::Engine,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the source buffer could not be opened as a document.
    pub fn is_load_error(&self) -> bool {
        self.kind() == ErrorKind::Load
    }

    /// `true` when a specific page failed to extract.
    pub fn is_extraction_error(&self) -> bool {
        self.kind() == ErrorKind::Extraction
    }
}

impl From<PageError> for Pdf2EpubError {
    fn from(e: PageError) -> Self {
        Pdf2EpubError::ExtractionFailed {
            page: e.page(),
            detail: e.detail().to_string(),
        }
    }
}

/// A failure confined to a single page.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PageError {
    #[error("page {page}: not openable: {detail}")]
    OpenFailed { page: usize, detail: String },

    #[error("page {page}: text unreadable: {detail}")]
    TextFailed { page: usize, detail: String },

    #[error("page {page}: render failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    #[error("page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::OpenFailed { page, .. }
            | PageError::TextFailed { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. } => *page,
        }
    }

    /// Underlying engine message.
    pub fn detail(&self) -> &str {
        match self {
            PageError::OpenFailed { detail, .. }
            | PageError::TextFailed { detail, .. }
            | PageError::RenderFailed { detail, .. }
            | PageError::EncodeFailed { detail, .. } => detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_pdf_is_load_error() {
        let e = Pdf2EpubError::NotAPdf {
            name: "notes.txt".into(),
            magic: b"hell".to_vec(),
        };
        assert!(e.is_load_error());
        assert!(!e.is_extraction_error());
        assert!(e.to_string().contains("notes.txt"));
    }

    #[test]
    fn empty_document_is_load_error() {
        let e = Pdf2EpubError::EmptyDocument { name: "x.pdf".into() };
        assert_eq!(e.kind(), ErrorKind::Load);
    }

    #[test]
    fn page_error_promotes_to_extraction_failed() {
        let page_err = PageError::TextFailed {
            page: 4,
            detail: "malformed content stream".into(),
        };
        let e: Pdf2EpubError = page_err.into();
        assert!(e.is_extraction_error());
        let msg = e.to_string();
        assert!(msg.contains("page 4"), "got: {msg}");
        assert!(msg.contains("malformed content stream"), "got: {msg}");
    }

    #[test]
    fn page_out_of_range_is_config_error() {
        let e = Pdf2EpubError::PageOutOfRange { page: 12, total: 3 };
        assert_eq!(e.kind(), ErrorKind::Config);
        assert!(!e.is_load_error());
    }

    #[test]
    fn cancelled_display() {
        let e = Pdf2EpubError::Cancelled {
            completed: 2,
            total: 9,
        };
        assert_eq!(e.kind(), ErrorKind::Cancelled);
        assert!(e.to_string().contains("2 of 9"));
    }

    #[test]
    fn page_error_accessors() {
        let e = PageError::RenderFailed {
            page: 7,
            detail: "bitmap alloc".into(),
        };
        assert_eq!(e.page(), 7);
        assert_eq!(e.detail(), "bitmap alloc");
    }
}
