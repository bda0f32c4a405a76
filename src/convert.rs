//! Conversion entry points.
//!
//! [`convert_document`] is the synchronous core: it drives extraction and
//! packaging over any [`SourceDocument`]. The async entry points resolve
//! input, then run the pdfium-backed core inside `spawn_blocking` because
//! pdfium is not async-safe.
//!
//! Pages are handed to the archive sink one at a time as they are
//! extracted, so peak memory is one page plus the archive itself.

use crate::config::{ConversionConfig, OutputFormat, PageFailurePolicy};
use crate::error::Pdf2EpubError;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, OutputArchive, PageResult};
use crate::pipeline::archive::new_sink;
use crate::pipeline::extract::{page_id, ExtractOptions, PageContent, PageExtractor};
use crate::pipeline::input;
use crate::pipeline::load::{bind_pdfium, validate_pdf_bytes, PdfiumDocument, SourceDocument};
use crate::pipeline::markup::sanitize_xml_chars;
use crate::pipeline::package::PackageMetadata;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Convert a PDF file or URL to an EPUB (or page-image archive).
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`: Local file path or HTTP/HTTPS URL to a PDF
/// * `config`: Conversion configuration
///
/// # Errors
/// - Input errors: file not found, permission denied, download failure
/// - Load errors: not a PDF, corrupt, encrypted, no pages
/// - `ExtractionFailed` on the first failing page under `Abort`
/// - `AllPagesFailed` when every page failed under `Isolate`
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_bytes(source.bytes, source.file_name, config).await
}

/// Convert PDF bytes held in memory.
///
/// `file_name` is used as the default book title and to derive the archive
/// name. The buffer is validated before pdfium is bound, so a non-PDF
/// buffer fails without touching the engine.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2epub::{convert_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("document.pdf")?;
/// let output = convert_bytes(bytes, "document.pdf", &ConversionConfig::default()).await?;
/// std::fs::write(&output.archive.file_name, &output.archive.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    bytes: Vec<u8>,
    file_name: impl Into<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let file_name = file_name.into();
    validate_pdf_bytes(&bytes, &file_name)?;

    let config = config.clone();
    tokio::task::spawn_blocking(move || convert_pdf_blocking(&bytes, &file_name, &config, None))
        .await
        .map_err(|e| Pdf2EpubError::Internal(format!("conversion task failed: {}", e)))?
}

/// Convert any loaded document. Synchronous.
///
/// ```rust
/// use edgequake_pdf2epub::{convert_document, ConversionConfig, InMemoryDocument};
///
/// let doc = InMemoryDocument::new()
///     .with_text_page(["Hello", "world"])
///     .with_text_page(["Second", "page"]);
/// let output = convert_document(&doc, "hello.pdf", &ConversionConfig::default()).unwrap();
/// assert_eq!(output.archive.file_name, "hello.epub");
/// assert_eq!(output.stats.processed_pages, 2);
/// ```
pub fn convert_document(
    doc: &dyn SourceDocument,
    file_name: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    run_conversion(doc, file_name, config, None)
}

/// Convert a PDF and write the archive to disk.
///
/// `output` may be a file path, an existing directory, or `None` (current
/// directory). For the last two the file name is derived from the source:
/// `<base-name>.<epub|zip>`. The write is atomic (temp file + rename).
///
/// Returns the path written and the conversion stats.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<(PathBuf, ConversionStats), Pdf2EpubError> {
    let result = convert(input_str, config).await?;
    let path = write_archive(&result.archive, output).await?;
    Ok((path, result.stats))
}

/// Write `archive` atomically. See [`convert_to_file`] for how `output` is
/// interpreted.
pub async fn write_archive(
    archive: &OutputArchive,
    output: Option<&Path>,
) -> Result<PathBuf, Pdf2EpubError> {
    let path = resolve_output_path(output, &archive.file_name);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2EpubError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
    }

    let mut tmp_path = path.clone().into_os_string();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    tokio::fs::write(&tmp_path, &archive.bytes)
        .await
        .map_err(|e| Pdf2EpubError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Pdf2EpubError::OutputWriteFailed { path, source: e });
    }

    info!("Wrote {} ({} bytes)", path.display(), archive.len());
    Ok(path)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2EpubError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2EpubError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Read PDF metadata without converting content.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, Pdf2EpubError> {
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    validate_pdf_bytes(&source.bytes, &source.file_name)?;

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let doc = PdfiumDocument::open(&pdfium, &source.bytes, &source.file_name, None)?;
        Ok(doc.metadata())
    })
    .await
    .map_err(|e| Pdf2EpubError::Internal(format!("inspect task failed: {}", e)))?
}

/// `<base-name>.<ext>` for a source file name, e.g. `report.pdf` → `report.epub`.
///
/// A bare dot-name such as `.pdf` has no usable base and becomes `document`.
pub fn derive_output_name(source_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && !(s.starts_with('.') && !s[1..].contains('.')))
        .unwrap_or_else(|| "document".to_string());
    format!("{}.{}", stem, format.extension())
}

fn resolve_output_path(output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        None => PathBuf::from(file_name),
        Some(p) if p.is_dir() => p.join(file_name),
        Some(p) => p.to_path_buf(),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Bind pdfium, open `bytes`, and run the conversion. Must run on a
/// blocking thread.
pub(crate) fn convert_pdf_blocking(
    bytes: &[u8],
    file_name: &str,
    config: &ConversionConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let pdfium = bind_pdfium()?;
    let doc = PdfiumDocument::open(&pdfium, bytes, file_name, config.password.as_deref())?;
    run_conversion(&doc, file_name, config, cancel)
}

/// Book metadata: explicit config values win, otherwise the file name,
/// a fresh `urn:uuid:` and the current time. Characters XML 1.0 forbids
/// are dropped, since file names may carry control characters.
fn package_metadata(file_name: &str, config: &ConversionConfig) -> PackageMetadata {
    let title = config.title.as_deref().unwrap_or(file_name);
    let identifier = match config.identifier.as_deref() {
        Some(id) => sanitize_xml_chars(id),
        None => format!("urn:uuid:{}", Uuid::new_v4()),
    };
    PackageMetadata {
        title: sanitize_xml_chars(title),
        language: sanitize_xml_chars(&config.language),
        identifier,
        creator: sanitize_xml_chars(&config.creator),
        modified: config.modified.unwrap_or_else(Utc::now),
    }
}

pub(crate) fn run_conversion(
    doc: &dyn SourceDocument,
    file_name: &str,
    config: &ConversionConfig,
    cancel: Option<&AtomicBool>,
) -> Result<ConversionOutput, Pdf2EpubError> {
    let total_start = Instant::now();
    let total_pages = doc.page_count();
    let metadata = doc.metadata();
    if total_pages == 0 {
        return Err(Pdf2EpubError::EmptyDocument {
            name: file_name.to_string(),
        });
    }

    let page_numbers = config.pages.to_page_numbers(total_pages);
    if page_numbers.is_empty() {
        return Err(Pdf2EpubError::PageOutOfRange {
            page: 0,
            total: total_pages,
        });
    }
    let selected = page_numbers.len();
    debug!("Selected {} of {} pages", selected, total_pages);

    let cb = config.progress_callback.as_deref();
    if let Some(cb) = cb {
        cb.on_conversion_start(selected);
    }

    let mut sink = new_sink(config.output_format, &config.language)?;
    let mut extractor = PageExtractor::new(doc, page_numbers, ExtractOptions::from(config));
    let mut pages: Vec<PageResult> = Vec::with_capacity(selected);

    // ── Extract + stream into the archive ────────────────────────────────
    let extract_start = Instant::now();
    while let Some(page_num) = extractor.next_page() {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            warn!("Conversion cancelled before page {}", page_num);
            return Err(Pdf2EpubError::Cancelled {
                completed: pages.len(),
                total: selected,
            });
        }

        if let Some(cb) = cb {
            cb.on_page_start(page_num, selected);
        }
        let page_start = Instant::now();
        let Some(result) = extractor.next() else {
            break;
        };

        match result {
            Ok(artifact) => {
                let body_len = artifact.body_len();
                let (text_chars, image_size) = match &artifact.content {
                    PageContent::Text(t) => (t.chars().count(), None),
                    PageContent::Image(img) => (0, Some((img.width, img.height))),
                };
                let id = artifact.id();
                sink.add_page(artifact)?;

                if let Some(cb) = cb {
                    cb.on_page_complete(page_num, selected, body_len);
                }
                pages.push(PageResult {
                    page_num,
                    id,
                    text_chars,
                    image_size,
                    duration_ms: page_start.elapsed().as_millis() as u64,
                    error: None,
                });
            }
            Err(err) => {
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, selected, &err.to_string());
                }
                match config.failure_policy {
                    PageFailurePolicy::Abort => return Err(err.into()),
                    PageFailurePolicy::Isolate => {
                        warn!("Page {} failed, inserting placeholder: {}", page_num, err);
                        sink.add_failed_page(&err)?;
                        pages.push(PageResult {
                            page_num,
                            id: page_id(page_num),
                            text_chars: 0,
                            image_size: None,
                            duration_ms: page_start.elapsed().as_millis() as u64,
                            error: Some(err),
                        });
                    }
                }
            }
        }
    }
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    let processed = pages.iter().filter(|p| p.error.is_none()).count();
    let failed = pages.len() - processed;
    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(Pdf2EpubError::AllPagesFailed {
            total: pages.len(),
            first_error,
        });
    }

    // ── Package ──────────────────────────────────────────────────────────
    if let Some(cb) = cb {
        cb.on_packaging_start(sink.members().len());
    }
    let package_start = Instant::now();
    let meta = package_metadata(file_name, config);
    let archive = sink.finish(&meta, derive_output_name(file_name, config.output_format))?;
    let package_duration_ms = package_start.elapsed().as_millis() as u64;

    let stats = ConversionStats {
        total_pages,
        processed_pages: processed,
        failed_pages: failed,
        skipped_pages: total_pages - selected,
        archive_bytes: archive.len(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        extract_duration_ms,
        package_duration_ms,
    };

    info!(
        "Conversion complete: {}/{} pages, {} members, {} bytes, {}ms total",
        processed,
        selected,
        archive.members.len(),
        stats.archive_bytes,
        stats.total_duration_ms
    );

    if let Some(cb) = cb {
        cb.on_conversion_complete(selected, processed);
    }

    Ok(ConversionOutput {
        archive,
        pages,
        metadata,
        stats,
    })
}
