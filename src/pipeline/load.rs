//! Document loading: open a PDF buffer and expose per-page access.
//!
//! [`SourceDocument`] is the seam between the PDF engine and the rest of the
//! pipeline. [`PdfiumDocument`] backs it with `pdfium-render`;
//! [`InMemoryDocument`] backs it with text the caller already has, which is
//! also how the pipeline is tested without a pdfium binary.
//!
//! ## Validation before binding
//!
//! The magic bytes (`%PDF`) are checked before pdfium is even bound, so a
//! garbage upload fails fast with [`Pdf2EpubError::NotAPdf`] and never
//! reaches the C++ parser.

use crate::error::{PageError, Pdf2EpubError};
use crate::output::DocumentMetadata;
use image::{DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Rasterisation settings passed to [`SourceDocument::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
    /// Cap on the longest rendered edge, in pixels.
    pub max_pixels: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_pixels: 2000,
        }
    }
}

/// A loaded document: page count plus per-page accessors.
///
/// Page numbers are 1-indexed: valid arguments are `1..=page_count()`.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Text runs of a page, in the order the engine reports them.
    fn text_runs(&self, page_num: usize) -> Result<Vec<String>, PageError>;

    /// Rasterise a page.
    fn render(&self, page_num: usize, options: &RenderOptions) -> Result<DynamicImage, PageError>;

    fn metadata(&self) -> DocumentMetadata;
}

/// Check that `bytes` plausibly hold a PDF.
pub fn validate_pdf_bytes(bytes: &[u8], name: &str) -> Result<(), Pdf2EpubError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(Pdf2EpubError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Bind to a pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (a library file or the directory
/// holding it), the working directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2EpubError> {
    let mut attempts: Vec<String> = Vec::new();

    if let Ok(raw) = std::env::var("PDFIUM_LIB_PATH") {
        if !raw.is_empty() {
            let path = PathBuf::from(&raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            match Pdfium::bind_to_library(&lib) {
                Ok(bindings) => {
                    debug!("Bound pdfium from PDFIUM_LIB_PATH: {}", lib.display());
                    return Ok(Pdfium::new(bindings));
                }
                Err(e) => attempts.push(format!("{}: {:?}", lib.display(), e)),
            }
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => {
            debug!("Bound pdfium from working directory");
            return Ok(Pdfium::new(bindings));
        }
        Err(e) => attempts.push(format!("{}: {:?}", local.display(), e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => {
            debug!("Bound system pdfium");
            Ok(Pdfium::new(bindings))
        }
        Err(e) => {
            attempts.push(format!("system library: {:?}", e));
            Err(Pdf2EpubError::PdfiumBindingFailed(attempts.join("; ")))
        }
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// A PDF opened through pdfium. Borrows the engine and the source bytes.
pub struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    page_count: usize,
}

impl<'a> PdfiumDocument<'a> {
    /// Open `bytes` as a PDF.
    ///
    /// # Errors
    /// LoadError variants only: `NotAPdf`, `PasswordRequired`,
    /// `WrongPassword`, `CorruptPdf`, `EmptyDocument`.
    pub fn open(
        pdfium: &'a Pdfium,
        bytes: &'a [u8],
        name: &str,
        password: Option<&'a str>,
    ) -> Result<Self, Pdf2EpubError> {
        validate_pdf_bytes(bytes, name)?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        Pdf2EpubError::WrongPassword {
                            name: name.to_string(),
                        }
                    } else {
                        Pdf2EpubError::PasswordRequired {
                            name: name.to_string(),
                        }
                    }
                } else {
                    Pdf2EpubError::CorruptPdf {
                        name: name.to_string(),
                        detail: err_str,
                    }
                }
            })?;

        let page_count = document.pages().len() as usize;
        if page_count == 0 {
            return Err(Pdf2EpubError::EmptyDocument {
                name: name.to_string(),
            });
        }
        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            document,
            page_count,
        })
    }

    fn page(&self, page_num: usize) -> Result<PdfPage<'_>, PageError> {
        if page_num == 0 || page_num > self.page_count {
            return Err(PageError::OpenFailed {
                page: page_num,
                detail: format!("no such page (document has {})", self.page_count),
            });
        }
        self.document
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| PageError::OpenFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })
    }
}

impl SourceDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn text_runs(&self, page_num: usize) -> Result<Vec<String>, PageError> {
        let page = self.page(page_num)?;
        let text = page.text().map_err(|e| PageError::TextFailed {
            page: page_num,
            detail: format!("{:?}", e),
        })?;

        let runs: Vec<String> = text
            .segments()
            .iter()
            .map(|segment| segment.text())
            .collect();
        debug!("Page {}: {} text runs", page_num, runs.len());
        Ok(runs)
    }

    fn render(&self, page_num: usize, options: &RenderOptions) -> Result<DynamicImage, PageError> {
        let page = self.page(page_num)?;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(options.max_pixels as i32)
            .set_maximum_height(options.max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn metadata(&self) -> DocumentMetadata {
        let metadata = self.document.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
            modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
            page_count: self.page_count,
            pdf_version: format!("{:?}", self.document.version()),
        }
    }
}

// ── In-memory backend ────────────────────────────────────────────────────

/// US Letter in PDF points.
const LETTER_POINTS: (u32, u32) = (612, 792);

#[derive(Debug, Clone)]
enum MemoryPage {
    Text(Vec<String>),
    Image(DynamicImage),
    Broken(String),
}

/// A document assembled from data the caller already holds.
///
/// Text pages render as blank US Letter bitmaps; image pages return their
/// bitmap as-is; broken pages fail every accessor with the given message.
///
/// ```rust
/// use edgequake_pdf2epub::{InMemoryDocument, SourceDocument};
///
/// let doc = InMemoryDocument::new()
///     .with_text_page(["Chapter", "one"])
///     .with_text_page(Vec::<String>::new());
/// assert_eq!(doc.page_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    pages: Vec<MemoryPage>,
    title: Option<String>,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Append a page made of the given text runs.
    pub fn with_text_page<I, S>(mut self, runs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pages
            .push(MemoryPage::Text(runs.into_iter().map(Into::into).collect()));
        self
    }

    /// Append a page whose rendering is `image`.
    pub fn with_image_page(mut self, image: DynamicImage) -> Self {
        self.pages.push(MemoryPage::Image(image));
        self
    }

    /// Append a page that fails to read with `detail`.
    pub fn with_broken_page(mut self, detail: impl Into<String>) -> Self {
        self.pages.push(MemoryPage::Broken(detail.into()));
        self
    }

    fn page(&self, page_num: usize) -> Result<&MemoryPage, PageError> {
        page_num
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| PageError::OpenFailed {
                page: page_num,
                detail: format!("no such page (document has {})", self.pages.len()),
            })
    }
}

impl SourceDocument for InMemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn text_runs(&self, page_num: usize) -> Result<Vec<String>, PageError> {
        match self.page(page_num)? {
            MemoryPage::Text(runs) => Ok(runs.clone()),
            MemoryPage::Image(_) => Ok(Vec::new()),
            MemoryPage::Broken(detail) => Err(PageError::TextFailed {
                page: page_num,
                detail: detail.clone(),
            }),
        }
    }

    fn render(&self, page_num: usize, options: &RenderOptions) -> Result<DynamicImage, PageError> {
        match self.page(page_num)? {
            MemoryPage::Image(img) => Ok(img.clone()),
            MemoryPage::Text(_) => {
                let (w, h) = scaled_size(LETTER_POINTS, options);
                Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                    w,
                    h,
                    Rgba([255, 255, 255, 255]),
                )))
            }
            MemoryPage::Broken(detail) => Err(PageError::RenderFailed {
                page: page_num,
                detail: detail.clone(),
            }),
        }
    }

    fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            page_count: self.pages.len(),
            pdf_version: "in-memory".to_string(),
            ..DocumentMetadata::default()
        }
    }
}

/// Pixel size of a page of `points` at `options.dpi`, longest edge capped.
fn scaled_size(points: (u32, u32), options: &RenderOptions) -> (u32, u32) {
    let scale = options.dpi as f64 / 72.0;
    let w = (points.0 as f64 * scale).round();
    let h = (points.1 as f64 * scale).round();
    let longest = w.max(h);
    let cap = options.max_pixels as f64;
    let factor = if longest > cap { cap / longest } else { 1.0 };
    (
        ((w * factor).round() as u32).max(1),
        ((h * factor).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_buffer() {
        let err = validate_pdf_bytes(b"", "empty.pdf").unwrap_err();
        assert!(err.is_load_error());
        assert!(matches!(err, Pdf2EpubError::NotAPdf { ref magic, .. } if magic.is_empty()));
    }

    #[test]
    fn test_validate_rejects_wrong_magic() {
        let err = validate_pdf_bytes(b"PK\x03\x04rest", "book.epub").unwrap_err();
        assert!(err.is_load_error());
    }

    #[test]
    fn test_validate_accepts_pdf_header() {
        assert!(validate_pdf_bytes(b"%PDF-1.7\n...", "ok.pdf").is_ok());
    }

    #[test]
    fn test_in_memory_page_access() {
        let doc = InMemoryDocument::new()
            .with_text_page(["A", "&", "B"])
            .with_broken_page("malformed content stream");

        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.text_runs(1).unwrap(), vec!["A", "&", "B"]);

        let err = doc.text_runs(2).unwrap_err();
        assert_eq!(err.page(), 2);
        assert!(matches!(err, PageError::TextFailed { .. }));

        assert!(matches!(doc.text_runs(0), Err(PageError::OpenFailed { .. })));
        assert!(matches!(doc.text_runs(3), Err(PageError::OpenFailed { .. })));
    }

    #[test]
    fn test_in_memory_render_respects_cap() {
        let doc = InMemoryDocument::new().with_text_page(["x"]);
        let img = doc
            .render(
                1,
                &RenderOptions {
                    dpi: 300,
                    max_pixels: 1000,
                },
            )
            .unwrap();
        assert_eq!(img.height(), 1000);
        assert!(img.width() < 1000);
    }

    #[test]
    fn test_scaled_size_at_72_dpi() {
        let size = scaled_size(
            LETTER_POINTS,
            &RenderOptions {
                dpi: 72,
                max_pixels: 2000,
            },
        );
        assert_eq!(size, (612, 792));
    }

    #[test]
    fn test_in_memory_metadata() {
        let doc = InMemoryDocument::new().with_title("Notes").with_text_page(["x"]);
        let meta = doc.metadata();
        assert_eq!(meta.title.as_deref(), Some("Notes"));
        assert_eq!(meta.page_count, 1);
    }
}
