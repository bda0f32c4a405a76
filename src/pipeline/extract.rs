//! Page extraction: turn each selected page into a [`PageArtifact`].
//!
//! Pages are visited strictly in ascending order. [`PageExtractor`] is an
//! iterator so the caller can hand every artifact to the package builder
//! the moment it exists; nothing here keeps a list of pages.
//!
//! Text mode joins the engine's text runs with single spaces. Reading order
//! is whatever order the engine reports; multi-column layouts and tables are
//! not reconstructed.

use crate::config::{ConversionConfig, PageImageFormat, PageMode};
use crate::error::PageError;
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::load::{RenderOptions, SourceDocument};
use crate::pipeline::markup::sanitize_xml_chars;
use tracing::debug;

/// Package identifier for a page: `page_<n>`.
pub fn page_id(page_num: usize) -> String {
    format!("page_{}", page_num)
}

/// What one page turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    /// Joined, XML-safe (but not yet escaped) text.
    Text(String),
    Image(EncodedImage),
}

/// The extracted form of one source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    /// 1-indexed source page number.
    pub page_num: usize,
    pub content: PageContent,
}

impl PageArtifact {
    pub fn id(&self) -> String {
        page_id(self.page_num)
    }

    /// Byte length of the text or encoded image.
    pub fn body_len(&self) -> usize {
        match &self.content {
            PageContent::Text(t) => t.len(),
            PageContent::Image(img) => img.bytes.len(),
        }
    }
}

/// Concatenate text runs with single-space separators.
pub fn join_text_runs(runs: &[String]) -> String {
    sanitize_xml_chars(&runs.join(" "))
}

/// Extraction settings, split out of [`ConversionConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub mode: PageMode,
    pub render: RenderOptions,
    pub image_format: PageImageFormat,
    pub jpeg_quality: u8,
}

impl From<&ConversionConfig> for ExtractOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            mode: config.page_mode,
            render: RenderOptions {
                dpi: config.dpi,
                max_pixels: config.max_rendered_pixels,
            },
            image_format: config.image_format,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Extract a single page.
pub fn extract_page(
    doc: &dyn SourceDocument,
    page_num: usize,
    options: &ExtractOptions,
) -> Result<PageArtifact, PageError> {
    let content = match options.mode {
        PageMode::Text => {
            let runs = doc.text_runs(page_num)?;
            let text = join_text_runs(&runs);
            debug!("Page {}: {} chars of text", page_num, text.chars().count());
            PageContent::Text(text)
        }
        PageMode::Image => {
            let image = doc.render(page_num, &options.render)?;
            let encoded = encode_page(&image, options.image_format, options.jpeg_quality)
                .map_err(|e| PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                })?;
            PageContent::Image(encoded)
        }
    };
    Ok(PageArtifact { page_num, content })
}

/// Lazily extracts the selected pages of a document, in page order.
pub struct PageExtractor<'d> {
    doc: &'d dyn SourceDocument,
    pages: std::vec::IntoIter<usize>,
    options: ExtractOptions,
}

impl<'d> PageExtractor<'d> {
    /// `page_numbers` must already be sorted and deduplicated, as produced
    /// by [`crate::config::PageSelection::to_page_numbers`].
    pub fn new(doc: &'d dyn SourceDocument, page_numbers: Vec<usize>, options: ExtractOptions) -> Self {
        debug_assert!(page_numbers.windows(2).all(|w| w[0] < w[1]));
        Self {
            doc,
            pages: page_numbers.into_iter(),
            options,
        }
    }

    /// Pages not yet visited.
    pub fn remaining(&self) -> usize {
        self.pages.len()
    }

    /// Page number the next call to `next()` will extract.
    pub fn next_page(&self) -> Option<usize> {
        self.pages.as_slice().first().copied()
    }
}

impl Iterator for PageExtractor<'_> {
    type Item = Result<PageArtifact, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_num = self.pages.next()?;
        Some(extract_page(self.doc, page_num, &self.options))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pages.size_hint()
    }
}
