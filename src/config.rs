//! Conversion settings.
//!
//! [`ConversionConfig`] is a plain cloneable value: it is moved onto the
//! blocking worker with the document bytes, and its `Debug` output is safe
//! to log. [`ConversionConfigBuilder::build`] is the only place settings are
//! checked against each other.

use crate::error::Pdf2EpubError;
use crate::progress::ProgressCallback;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default `dc:creator` written into the package document.
pub const DEFAULT_CREATOR: &str = "PDF to EPUB Converter";

/// Default `dc:language` tag.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Everything that shapes one conversion.
///
/// `ConversionConfig::default()` gives a text EPUB of every page that aborts
/// on the first unreadable page.
///
/// ```rust
/// use edgequake_pdf2epub::{ConversionConfig, PageMode};
///
/// let config = ConversionConfig::builder()
///     .page_mode(PageMode::Image)
///     .dpi(200)
///     .language("fr")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Container produced by the conversion. Default: [`OutputFormat::Epub`].
    pub output_format: OutputFormat,

    /// What each page becomes: extracted text or a rendered image.
    /// Default: [`PageMode::Text`].
    pub page_mode: PageMode,

    /// Encoding for rendered pages in image mode. Default: PNG.
    pub image_format: PageImageFormat,

    /// Rendering DPI used in image mode. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Upper bound on the longest edge of a rendered page, in pixels,
    /// applied after DPI scaling. Default: 2000.
    pub max_rendered_pixels: u32,

    /// JPEG quality (1–100) when `image_format` is JPEG. Default: 85.
    pub jpeg_quality: u8,

    /// Which pages to convert. Default: [`PageSelection::All`].
    pub pages: PageSelection,

    /// What happens when a single page cannot be read. Default: `Abort`.
    pub failure_policy: PageFailurePolicy,

    /// User password, for encrypted PDFs.
    pub password: Option<String>,

    /// Book title. If None, the source file name is used.
    pub title: Option<String>,

    /// `dc:language` tag. Default: `en`.
    pub language: String,

    /// `dc:creator` value. Default: [`DEFAULT_CREATOR`].
    pub creator: String,

    /// Package identifier. If None, a fresh `urn:uuid:` is generated per run.
    ///
    /// Pin this (together with `modified`) to get byte-identical archives
    /// from identical inputs.
    pub identifier: Option<String>,

    /// `dcterms:modified` timestamp. If None, the current time is used.
    pub modified: Option<DateTime<Utc>>,

    /// Applies to URL inputs only. Default: 120 s.
    pub download_timeout_secs: u64,

    /// Receives per-page events while the conversion runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            page_mode: PageMode::default(),
            image_format: PageImageFormat::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            jpeg_quality: 85,
            pages: PageSelection::default(),
            failure_policy: PageFailurePolicy::default(),
            password: None,
            title: None,
            language: DEFAULT_LANGUAGE.to_string(),
            creator: DEFAULT_CREATOR.to_string(),
            identifier: None,
            modified: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_format", &self.output_format)
            .field("page_mode", &self.page_mode)
            .field("image_format", &self.image_format)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("failure_policy", &self.failure_policy)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("title", &self.title)
            .field("language", &self.language)
            .field("creator", &self.creator)
            .field("identifier", &self.identifier)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Start from the defaults.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Chained setters over a default [`ConversionConfig`]; [`build`](Self::build)
/// validates.
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn page_mode(mut self, mode: PageMode) -> Self {
        self.config.page_mode = mode;
        self
    }

    pub fn image_format(mut self, format: PageImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    /// Values below 100 are raised to 100.
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn failure_policy(mut self, policy: PageFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.config.creator = creator.into();
        self
    }

    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.config.identifier = Some(id.into());
        self
    }

    pub fn modified(mut self, at: DateTime<Utc>) -> Self {
        self.config.modified = Some(at);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn build(self) -> Result<ConversionConfig, Pdf2EpubError> {
        let c = &self.config;
        if !(72..=400).contains(&c.dpi) {
            return Err(Pdf2EpubError::InvalidConfig(format!(
                "dpi {} outside 72..=400",
                c.dpi
            )));
        }
        if c.output_format == OutputFormat::ImageArchive && c.page_mode != PageMode::Image {
            return Err(Pdf2EpubError::InvalidConfig(
                "Image archives require image page mode".into(),
            ));
        }
        if c.language.trim().is_empty() {
            return Err(Pdf2EpubError::InvalidConfig(
                "Language tag must not be empty".into(),
            ));
        }
        if let Some(ref id) = c.identifier {
            if id.trim().is_empty() {
                return Err(Pdf2EpubError::InvalidConfig(
                    "Identifier must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The container written at the end of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// EPUB e-book (`.epub`). (default)
    #[default]
    Epub,
    /// Plain ZIP of page images (`.zip`). Requires [`PageMode::Image`].
    ImageArchive,
}

impl OutputFormat {
    /// File extension used when deriving the output name.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::ImageArchive => "zip",
        }
    }

    /// MIME type of the produced archive.
    pub fn media_type(self) -> &'static str {
        match self {
            OutputFormat::Epub => "application/epub+zip",
            OutputFormat::ImageArchive => "application/zip",
        }
    }
}

/// How each source page is turned into book content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageMode {
    /// Text runs joined with single spaces; no layout reconstruction. (default)
    #[default]
    Text,
    /// The page rasterised to a bitmap.
    Image,
}

/// Encoding for rasterised pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageImageFormat {
    /// Lossless; keeps rendered text crisp. (default)
    #[default]
    Png,
    Jpeg,
}

impl PageImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PageImageFormat::Png => "png",
            PageImageFormat::Jpeg => "jpg",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
            PageImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// What to do when a single page cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFailurePolicy {
    /// Abort the whole conversion on the first failing page. (default)
    #[default]
    Abort,
    /// Replace the failing page with a placeholder and keep going; the
    /// failure is reported in the page's [`crate::output::PageResult`].
    Isolate,
}

/// Pages to convert, by 1-indexed PDF page number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    #[default]
    All,
    Single(usize),
    /// Inclusive on both ends.
    Range(usize, usize),
    /// Any order; duplicates collapse.
    Set(Vec<usize>),
}

impl PageSelection {
    /// Page numbers that exist in a document of `total_pages`, ascending and
    /// without duplicates. Numbers past the end are dropped silently.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        let exists = |p: &usize| (1..=total_pages).contains(p);
        match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => Some(*p).filter(exists).into_iter().collect(),
            PageSelection::Range(start, end) => {
                (*start..=(*end).min(total_pages)).filter(exists).collect()
            }
            PageSelection::Set(pages) => {
                let unique: std::collections::BTreeSet<usize> =
                    pages.iter().copied().filter(exists).collect();
                unique.into_iter().collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_selection_to_page_numbers() {
        assert_eq!(PageSelection::All.to_page_numbers(3), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(2).to_page_numbers(3), vec![2]);
        assert_eq!(PageSelection::Single(4).to_page_numbers(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_page_numbers(4), vec![2, 3, 4]);
        assert_eq!(PageSelection::Range(0, 2).to_page_numbers(4), vec![1, 2]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3, 9]).to_page_numbers(5),
            vec![1, 3]
        );
        assert_eq!(PageSelection::All.to_page_numbers(0), Vec::<usize>::new());
    }

    #[test]
    fn dpi_outside_range_rejected() {
        assert!(ConversionConfig::builder().dpi(1000).build().is_err());
        assert!(ConversionConfig::builder().dpi(10).build().is_err());
        assert_eq!(ConversionConfig::builder().dpi(400).build().unwrap().dpi, 400);
    }

    #[test]
    fn image_archive_requires_image_mode() {
        let err = ConversionConfig::builder()
            .output_format(OutputFormat::ImageArchive)
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2EpubError::InvalidConfig(_)));

        let ok = ConversionConfig::builder()
            .output_format(OutputFormat::ImageArchive)
            .page_mode(PageMode::Image)
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn empty_language_rejected() {
        let err = ConversionConfig::builder().language("  ").build().unwrap_err();
        assert!(err.to_string().contains("Language"));
    }

    #[test]
    fn defaults_produce_text_epub() {
        let c = ConversionConfig::default();
        assert_eq!(c.output_format, OutputFormat::Epub);
        assert_eq!(c.page_mode, PageMode::Text);
        assert_eq!(c.failure_policy, PageFailurePolicy::Abort);
        assert_eq!(c.language, "en");
        assert_eq!(c.creator, DEFAULT_CREATOR);
        assert!(c.identifier.is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let c = ConversionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn format_extensions() {
        assert_eq!(OutputFormat::Epub.extension(), "epub");
        assert_eq!(OutputFormat::ImageArchive.extension(), "zip");
        assert_eq!(PageImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(PageImageFormat::Png.media_type(), "image/png");
    }
}
