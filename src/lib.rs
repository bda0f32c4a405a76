//! # edgequake-pdf2epub
//!
//! Convert PDF documents into EPUB books, one page at a time.
//!
//! Each PDF page becomes one XHTML page in the book: either the page's text
//! (joined in the order the PDF engine reports it) or a rendered image of the
//! page. The book gets a navigation entry per page, so readers can jump to
//! "Page 12" the way they would in the PDF. The same pipeline can instead
//! produce a plain ZIP of page images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    read local file or download from URL
//!  ├─ 2. Load     validate + open via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Extract  per page, in order: text runs or rendered PNG/JPEG
//!  ├─ 4. Package  XHTML page, manifest item, spine ref, nav point
//!  └─ 5. Archive  mimetype, container.xml, pages, toc.ncx, nav.xhtml, content.opf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2epub::{convert_to_file, ConversionConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let (path, stats) = convert_to_file("document.pdf", Some(Path::new("out/")), &config).await?;
//!     eprintln!("{}: {} pages", path.display(), stats.processed_pages);
//!     Ok(())
//! }
//! ```
//!
//! Without a pdfium binary at hand, any [`SourceDocument`] can be converted
//! directly:
//!
//! ```rust
//! use edgequake_pdf2epub::{convert_document, ConversionConfig, InMemoryDocument};
//!
//! let doc = InMemoryDocument::new().with_text_page(["A", "&", "B"]);
//! let output = convert_document(&doc, "notes.pdf", &ConversionConfig::default()).unwrap();
//! assert_eq!(output.archive.members[0], "mimetype");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2epub` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2epub = { version = "0.1", default-features = false }
//! ```
//!
//! ## Finding pdfium
//!
//! The pdfium shared library is looked up in `PDFIUM_LIB_PATH` (file or
//! directory), then the working directory, then the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, OutputFormat, PageFailurePolicy, PageImageFormat,
    PageMode, PageSelection,
};
pub use convert::{
    convert, convert_bytes, convert_document, convert_sync, convert_to_file, derive_output_name,
    inspect, write_archive,
};
pub use error::{ErrorKind, PageError, Pdf2EpubError};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, OutputArchive, PageResult};
pub use pipeline::load::{InMemoryDocument, RenderOptions, SourceDocument};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{
    spawn_conversion, spawn_document_conversion, CancelHandle, ConversionEvent, ConversionTask,
    EventStream,
};
