//! Archive serialisation: stream page artifacts into a ZIP container.
//!
//! [`ArchiveSink`] is what the conversion loop talks to. Each artifact is
//! written into the ZIP as soon as it arrives; only the small manifest is
//! kept until [`ArchiveSink::finish`] writes the navigation and package
//! documents.
//!
//! ## EPUB member layout
//!
//! The OCF container format requires the `mimetype` member to be the very
//! first entry, stored without compression, containing exactly
//! `application/epub+zip`. Readers sniff those bytes at a fixed offset.
//! Every other member is deflated. Member timestamps are pinned to the ZIP
//! epoch so identical inputs yield identical bytes.

use crate::config::OutputFormat;
use crate::error::{PageError, Pdf2EpubError};
use crate::output::OutputArchive;
use crate::pipeline::extract::{PageArtifact, PageContent};
use crate::pipeline::markup::{image_page_xhtml, page_body_xhtml, placeholder_page_xhtml};
use crate::pipeline::package::{
    container_xml, content_opf, nav_xhtml, toc_ncx, PackageManifest, PackageMetadata,
    CONTAINER_PATH, CONTENT_DIR, NAV_HREF, NCX_HREF, PACKAGE_PATH,
};
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Exact content of the EPUB `mimetype` member.
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Receives page artifacts in page order and produces the final archive.
pub trait ArchiveSink {
    /// Write one extracted page.
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), Pdf2EpubError>;

    /// Record a page that failed under the `Isolate` policy.
    fn add_failed_page(&mut self, error: &PageError) -> Result<(), Pdf2EpubError>;

    /// Members written so far, in order.
    fn members(&self) -> &[String];

    /// Write the closing members and serialise the archive.
    fn finish(
        self: Box<Self>,
        meta: &PackageMetadata,
        file_name: String,
    ) -> Result<OutputArchive, Pdf2EpubError>;
}

/// Create the sink for `format`.
pub fn new_sink(format: OutputFormat, language: &str) -> Result<Box<dyn ArchiveSink>, Pdf2EpubError> {
    Ok(match format {
        OutputFormat::Epub => Box::new(EpubBuilder::new(language)?),
        OutputFormat::ImageArchive => Box::new(ImageArchiveBuilder::new()),
    })
}

fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

fn zip_error(member: &str, e: impl std::fmt::Display) -> Pdf2EpubError {
    Pdf2EpubError::PackagingFailed {
        member: member.to_string(),
        detail: e.to_string(),
    }
}

/// Shared ZIP plumbing: a writer plus the ordered member list.
struct MemberWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    members: Vec<String>,
}

impl MemberWriter {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            members: Vec::new(),
        }
    }

    fn write(
        &mut self,
        name: &str,
        options: SimpleFileOptions,
        data: &[u8],
    ) -> Result<(), Pdf2EpubError> {
        self.zip
            .start_file(name, options)
            .map_err(|e| zip_error(name, e))?;
        self.zip.write_all(data).map_err(|e| zip_error(name, e))?;
        self.members.push(name.to_string());
        debug!("Archived {} ({} bytes)", name, data.len());
        Ok(())
    }

    fn finish(self) -> Result<(Vec<u8>, Vec<String>), Pdf2EpubError> {
        let cursor = self.zip.finish().map_err(|e| zip_error("<central directory>", e))?;
        Ok((cursor.into_inner(), self.members))
    }
}

// ── EPUB ─────────────────────────────────────────────────────────────────

/// Builds an EPUB from page artifacts.
pub struct EpubBuilder {
    out: MemberWriter,
    manifest: PackageManifest,
    language: String,
}

impl EpubBuilder {
    /// Start a new book: writes `mimetype` and `container.xml` immediately.
    pub fn new(language: &str) -> Result<Self, Pdf2EpubError> {
        let mut out = MemberWriter::new();
        out.write("mimetype", stored(), EPUB_MIMETYPE.as_bytes())?;
        out.write(CONTAINER_PATH, deflated(), container_xml()?.as_bytes())?;
        Ok(Self {
            out,
            manifest: PackageManifest::new(),
            language: language.to_string(),
        })
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }
}

impl ArchiveSink for EpubBuilder {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), Pdf2EpubError> {
        let page_num = artifact.page_num;
        let href = self.manifest.push_page(page_num);

        match artifact.content {
            PageContent::Text(text) => {
                let body = page_body_xhtml(page_num, &text, &self.language);
                self.out
                    .write(&format!("{}/{}", CONTENT_DIR, href), deflated(), body.as_bytes())?;
            }
            PageContent::Image(image) => {
                let image_href = format!("images/page_{}.{}", page_num, image.extension());
                let body = image_page_xhtml(page_num, &image_href, &self.language);
                self.out
                    .write(&format!("{}/{}", CONTENT_DIR, href), deflated(), body.as_bytes())?;
                self.out.write(
                    &format!("{}/{}", CONTENT_DIR, image_href),
                    stored(),
                    &image.bytes,
                )?;
                self.manifest.push_resource(
                    format!("img_{}", page_num),
                    image_href,
                    image.media_type(),
                );
            }
        }
        Ok(())
    }

    fn add_failed_page(&mut self, error: &PageError) -> Result<(), Pdf2EpubError> {
        let page_num = error.page();
        let href = self.manifest.push_page(page_num);
        let body = placeholder_page_xhtml(page_num, &error.to_string(), &self.language);
        self.out
            .write(&format!("{}/{}", CONTENT_DIR, href), deflated(), body.as_bytes())
    }

    fn members(&self) -> &[String] {
        &self.out.members
    }

    fn finish(
        mut self: Box<Self>,
        meta: &PackageMetadata,
        file_name: String,
    ) -> Result<OutputArchive, Pdf2EpubError> {
        let ncx = toc_ncx(meta, &self.manifest)?;
        let nav = nav_xhtml(meta, &self.manifest)?;
        let opf = content_opf(meta, &self.manifest)?;

        self.out
            .write(&format!("{}/{}", CONTENT_DIR, NCX_HREF), deflated(), ncx.as_bytes())?;
        self.out
            .write(&format!("{}/{}", CONTENT_DIR, NAV_HREF), deflated(), nav.as_bytes())?;
        self.out.write(PACKAGE_PATH, deflated(), opf.as_bytes())?;

        let (bytes, members) = self.out.finish()?;
        Ok(OutputArchive {
            file_name,
            media_type: OutputFormat::Epub.media_type().to_string(),
            members,
            identifier: Some(meta.identifier.clone()),
            bytes,
        })
    }
}

// ── Page images ──────────────────────────────────────────────────────────

/// Builds a flat ZIP of page images (`page_<n>.<ext>`).
pub struct ImageArchiveBuilder {
    out: MemberWriter,
}

impl ImageArchiveBuilder {
    pub fn new() -> Self {
        Self {
            out: MemberWriter::new(),
        }
    }
}

impl Default for ImageArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSink for ImageArchiveBuilder {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), Pdf2EpubError> {
        let id = artifact.id();
        match artifact.content {
            PageContent::Image(image) => {
                let name = format!("{}.{}", id, image.extension());
                // PNG/JPEG are already compressed.
                self.out.write(&name, stored(), &image.bytes)
            }
            PageContent::Text(_) => Err(Pdf2EpubError::PackagingFailed {
                member: id,
                detail: "image archives only accept rendered pages".into(),
            }),
        }
    }

    fn add_failed_page(&mut self, error: &PageError) -> Result<(), Pdf2EpubError> {
        warn!("Omitting page {} from image archive: {}", error.page(), error);
        Ok(())
    }

    fn members(&self) -> &[String] {
        &self.out.members
    }

    fn finish(
        self: Box<Self>,
        _meta: &PackageMetadata,
        file_name: String,
    ) -> Result<OutputArchive, Pdf2EpubError> {
        let (bytes, members) = self.out.finish()?;
        Ok(OutputArchive {
            file_name,
            media_type: OutputFormat::ImageArchive.media_type().to_string(),
            members,
            identifier: None,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageImageFormat;
    use crate::pipeline::encode::EncodedImage;
    use chrono::{TimeZone, Utc};
    use std::io::Read;
    use zip::ZipArchive;

    fn meta() -> PackageMetadata {
        PackageMetadata {
            title: "doc.pdf".into(),
            language: "en".into(),
            identifier: "urn:uuid:fixed".into(),
            creator: "PDF to EPUB Converter".into(),
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn text(page_num: usize, s: &str) -> PageArtifact {
        PageArtifact {
            page_num,
            content: PageContent::Text(s.into()),
        }
    }

    fn png(page_num: usize) -> PageArtifact {
        PageArtifact {
            page_num,
            content: PageContent::Image(EncodedImage {
                format: PageImageFormat::Png,
                width: 1,
                height: 1,
                bytes: vec![0x89, b'P', b'N', b'G'],
            }),
        }
    }

    fn read_member(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let mut b: Box<dyn ArchiveSink> = Box::new(EpubBuilder::new("en").unwrap());
        b.add_page(text(1, "hello")).unwrap();
        let out = b.finish(&meta(), "doc.epub".into()).unwrap();

        // Local file header of the first entry: name at offset 30, data right after.
        assert_eq!(&out.bytes[0..4], b"PK\x03\x04");
        assert_eq!(u16::from_le_bytes([out.bytes[8], out.bytes[9]]), 0, "stored");
        assert_eq!(&out.bytes[30..38], b"mimetype");
        let extra_len = u16::from_le_bytes([out.bytes[28], out.bytes[29]]) as usize;
        let data_start = 38 + extra_len;
        assert_eq!(
            &out.bytes[data_start..data_start + EPUB_MIMETYPE.len()],
            EPUB_MIMETYPE.as_bytes()
        );

        let mut archive = ZipArchive::new(Cursor::new(&out.bytes)).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn member_order() {
        let mut b: Box<dyn ArchiveSink> = Box::new(EpubBuilder::new("en").unwrap());
        b.add_page(text(1, "a")).unwrap();
        b.add_page(text(2, "b")).unwrap();
        let out = b.finish(&meta(), "doc.epub".into()).unwrap();
        assert_eq!(
            out.members,
            [
                "mimetype",
                "META-INF/container.xml",
                "OEBPS/page_1.xhtml",
                "OEBPS/page_2.xhtml",
                "OEBPS/toc.ncx",
                "OEBPS/nav.xhtml",
                "OEBPS/content.opf",
            ]
        );
        assert_eq!(out.media_type, "application/epub+zip");
    }

    #[test]
    fn image_pages_carry_their_image() {
        let mut b: Box<dyn ArchiveSink> = Box::new(EpubBuilder::new("en").unwrap());
        b.add_page(png(1)).unwrap();
        let out = b.finish(&meta(), "doc.epub".into()).unwrap();

        assert!(out.members.contains(&"OEBPS/images/page_1.png".to_string()));
        let page = read_member(&out.bytes, "OEBPS/page_1.xhtml");
        assert!(page.contains("src=\"images/page_1.png\""));
        let opf = read_member(&out.bytes, "OEBPS/content.opf");
        assert!(opf.contains("id=\"img_1\""));
        assert!(opf.contains("media-type=\"image/png\""));
        assert_eq!(opf.matches("<itemref ").count(), 1);
    }

    #[test]
    fn failed_page_becomes_placeholder() {
        let mut b: Box<dyn ArchiveSink> = Box::new(EpubBuilder::new("en").unwrap());
        b.add_page(text(1, "fine")).unwrap();
        b.add_failed_page(&PageError::TextFailed {
            page: 2,
            detail: "bad xref".into(),
        })
        .unwrap();
        let out = b.finish(&meta(), "doc.epub".into()).unwrap();

        let page = read_member(&out.bytes, "OEBPS/page_2.xhtml");
        assert!(page.contains("extraction-failed"));
        assert!(page.contains("bad xref"));
        let ncx = read_member(&out.bytes, "OEBPS/toc.ncx");
        assert!(ncx.contains("dtb:totalPageCount\" content=\"2\""));
    }

    #[test]
    fn image_archive_lists_pages_in_order() {
        let mut b: Box<dyn ArchiveSink> = Box::new(ImageArchiveBuilder::new());
        b.add_page(png(1)).unwrap();
        b.add_failed_page(&PageError::RenderFailed {
            page: 2,
            detail: "oom".into(),
        })
        .unwrap();
        b.add_page(png(3)).unwrap();
        let out = b.finish(&meta(), "doc.zip".into()).unwrap();
        assert_eq!(out.members, ["page_1.png", "page_3.png"]);
        assert_eq!(out.media_type, "application/zip");
        assert!(out.identifier.is_none());
    }

    #[test]
    fn image_archive_rejects_text() {
        let mut b = ImageArchiveBuilder::new();
        let err = b.add_page(text(1, "no")).unwrap_err();
        assert!(matches!(err, Pdf2EpubError::PackagingFailed { .. }));
    }
}
