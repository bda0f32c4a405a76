//! EPUB package model and its XML documents.
//!
//! [`PackageManifest`] accumulates, page by page, the three ordered
//! sequences an EPUB needs: manifest items, spine references and navigation
//! points. All three are keyed by the same `page_<n>` identifier and only
//! ever appended to, so their lengths and order always agree.
//!
//! The serialisers below turn the manifest into `container.xml`,
//! `content.opf`, `toc.ncx` and `nav.xhtml`.

use crate::error::Pdf2EpubError;
use crate::pipeline::extract::page_id;
use crate::pipeline::markup::page_label;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// Directory holding every content document.
pub const CONTENT_DIR: &str = "OEBPS";
/// Full archive path of the package document.
pub const PACKAGE_PATH: &str = "OEBPS/content.opf";
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
/// Navigation documents, relative to [`CONTENT_DIR`].
pub const NCX_HREF: &str = "toc.ncx";
pub const NAV_HREF: &str = "nav.xhtml";

pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Relative to [`CONTENT_DIR`].
    pub href: String,
    pub media_type: String,
}

/// One table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub id: String,
    pub label: String,
    pub target: String,
    /// 1-based reading position.
    pub order: usize,
}

/// Book-level metadata written into `content.opf`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMetadata {
    pub title: String,
    pub language: String,
    pub identifier: String,
    pub creator: String,
    pub modified: DateTime<Utc>,
}

/// Manifest, spine and navigation, built in page order.
#[derive(Debug, Clone, Default)]
pub struct PackageManifest {
    pages: Vec<ManifestItem>,
    spine: Vec<String>,
    nav: Vec<NavPoint>,
    resources: Vec<ManifestItem>,
}

impl PackageManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page document. Returns its href.
    pub fn push_page(&mut self, page_num: usize) -> String {
        let id = page_id(page_num);
        let href = format!("{}.xhtml", id);
        self.pages.push(ManifestItem {
            id: id.clone(),
            href: href.clone(),
            media_type: XHTML_MEDIA_TYPE.to_string(),
        });
        self.spine.push(id.clone());
        self.nav.push(NavPoint {
            id,
            label: page_label(page_num),
            target: href.clone(),
            order: self.nav.len() + 1,
        });
        href
    }

    /// Register a non-spine resource such as a page image.
    pub fn push_resource(&mut self, id: String, href: String, media_type: &str) {
        self.resources.push(ManifestItem {
            id,
            href,
            media_type: media_type.to_string(),
        });
    }

    pub fn page_items(&self) -> &[ManifestItem] {
        &self.pages
    }

    pub fn spine(&self) -> &[String] {
        &self.spine
    }

    pub fn nav_points(&self) -> &[NavPoint] {
        &self.nav
    }

    pub fn resources(&self) -> &[ManifestItem] {
        &self.resources
    }

    /// Number of pages registered.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn packaging_error(member: &str, e: impl std::fmt::Display) -> Pdf2EpubError {
    Pdf2EpubError::PackagingFailed {
        member: member.to_string(),
        detail: e.to_string(),
    }
}

/// Small wrapper so every write maps its error to the document being built.
struct XmlDoc {
    member: &'static str,
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlDoc {
    fn new(member: &'static str) -> Result<Self, Pdf2EpubError> {
        let mut doc = Self {
            member,
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        };
        doc.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(doc)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), Pdf2EpubError> {
        self.writer
            .write_event(event)
            .map_err(|e| packaging_error(self.member, e))
    }

    fn start(&mut self, elem: BytesStart<'_>) -> Result<(), Pdf2EpubError> {
        self.event(Event::Start(elem))
    }

    fn end(&mut self, name: &str) -> Result<(), Pdf2EpubError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, elem: BytesStart<'_>) -> Result<(), Pdf2EpubError> {
        self.event(Event::Empty(elem))
    }

    fn simple(&mut self, elem: BytesStart<'_>, value: &str) -> Result<(), Pdf2EpubError> {
        let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
        self.start(elem)?;
        self.event(Event::Text(BytesText::new(value)))?;
        self.end(&name)
    }

    fn finish(self) -> Result<String, Pdf2EpubError> {
        let member = self.member;
        let mut bytes = self.writer.into_inner().into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| packaging_error(member, e))
    }
}

/// `META-INF/container.xml`, pointing at [`PACKAGE_PATH`].
pub fn container_xml() -> Result<String, Pdf2EpubError> {
    let mut doc = XmlDoc::new(CONTAINER_PATH)?;

    let mut container = BytesStart::new("container");
    container.push_attribute(("version", "1.0"));
    container.push_attribute(("xmlns", "urn:oasis:names:tc:opendocument:xmlns:container"));
    doc.start(container)?;
    doc.start(BytesStart::new("rootfiles"))?;

    let mut rootfile = BytesStart::new("rootfile");
    rootfile.push_attribute(("full-path", PACKAGE_PATH));
    rootfile.push_attribute(("media-type", "application/oebps-package+xml"));
    doc.empty(rootfile)?;

    doc.end("rootfiles")?;
    doc.end("container")?;
    doc.finish()
}

/// `content.opf`: metadata, manifest and spine.
pub fn content_opf(
    meta: &PackageMetadata,
    manifest: &PackageManifest,
) -> Result<String, Pdf2EpubError> {
    let mut doc = XmlDoc::new(PACKAGE_PATH)?;

    let mut package = BytesStart::new("package");
    package.push_attribute(("xmlns", "http://www.idpf.org/2007/opf"));
    package.push_attribute(("version", "3.0"));
    package.push_attribute(("unique-identifier", "book-id"));
    package.push_attribute(("xml:lang", meta.language.as_str()));
    doc.start(package)?;

    // ── metadata ──
    let mut metadata = BytesStart::new("metadata");
    metadata.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    doc.start(metadata)?;

    let mut identifier = BytesStart::new("dc:identifier");
    identifier.push_attribute(("id", "book-id"));
    doc.simple(identifier, &meta.identifier)?;
    doc.simple(BytesStart::new("dc:title"), &meta.title)?;
    doc.simple(BytesStart::new("dc:language"), &meta.language)?;
    doc.simple(BytesStart::new("dc:creator"), &meta.creator)?;

    let mut modified = BytesStart::new("meta");
    modified.push_attribute(("property", "dcterms:modified"));
    doc.simple(
        modified,
        &meta.modified.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;
    doc.end("metadata")?;

    // ── manifest ──
    doc.start(BytesStart::new("manifest"))?;

    let mut ncx = BytesStart::new("item");
    ncx.push_attribute(("id", "ncx"));
    ncx.push_attribute(("href", NCX_HREF));
    ncx.push_attribute(("media-type", NCX_MEDIA_TYPE));
    doc.empty(ncx)?;

    let mut nav = BytesStart::new("item");
    nav.push_attribute(("id", "nav"));
    nav.push_attribute(("href", NAV_HREF));
    nav.push_attribute(("media-type", XHTML_MEDIA_TYPE));
    nav.push_attribute(("properties", "nav"));
    doc.empty(nav)?;

    for item in manifest.page_items().iter().chain(manifest.resources()) {
        let mut elem = BytesStart::new("item");
        elem.push_attribute(("id", item.id.as_str()));
        elem.push_attribute(("href", item.href.as_str()));
        elem.push_attribute(("media-type", item.media_type.as_str()));
        doc.empty(elem)?;
    }
    doc.end("manifest")?;

    // ── spine ──
    let mut spine = BytesStart::new("spine");
    spine.push_attribute(("toc", "ncx"));
    doc.start(spine)?;
    for idref in manifest.spine() {
        let mut itemref = BytesStart::new("itemref");
        itemref.push_attribute(("idref", idref.as_str()));
        doc.empty(itemref)?;
    }
    doc.end("spine")?;

    doc.end("package")?;
    doc.finish()
}

/// `toc.ncx`: one navPoint per page plus page-count metadata.
pub fn toc_ncx(meta: &PackageMetadata, manifest: &PackageManifest) -> Result<String, Pdf2EpubError> {
    let mut doc = XmlDoc::new("OEBPS/toc.ncx")?;
    let page_count = manifest.nav_points().len().to_string();

    let mut ncx = BytesStart::new("ncx");
    ncx.push_attribute(("xmlns", "http://www.daisy.org/z3986/2005/ncx/"));
    ncx.push_attribute(("version", "2005-1"));
    doc.start(ncx)?;

    doc.start(BytesStart::new("head"))?;
    for (name, content) in [
        ("dtb:uid", meta.identifier.as_str()),
        ("dtb:depth", "1"),
        ("dtb:totalPageCount", page_count.as_str()),
        ("dtb:maxPageNumber", page_count.as_str()),
    ] {
        let mut m = BytesStart::new("meta");
        m.push_attribute(("name", name));
        m.push_attribute(("content", content));
        doc.empty(m)?;
    }
    doc.end("head")?;

    doc.start(BytesStart::new("docTitle"))?;
    doc.simple(BytesStart::new("text"), &meta.title)?;
    doc.end("docTitle")?;

    doc.start(BytesStart::new("navMap"))?;
    for point in manifest.nav_points() {
        let order = point.order.to_string();
        let mut nav_point = BytesStart::new("navPoint");
        nav_point.push_attribute(("id", point.id.as_str()));
        nav_point.push_attribute(("playOrder", order.as_str()));
        doc.start(nav_point)?;

        doc.start(BytesStart::new("navLabel"))?;
        doc.simple(BytesStart::new("text"), &point.label)?;
        doc.end("navLabel")?;

        let mut content = BytesStart::new("content");
        content.push_attribute(("src", point.target.as_str()));
        doc.empty(content)?;

        doc.end("navPoint")?;
    }
    doc.end("navMap")?;

    doc.end("ncx")?;
    doc.finish()
}

/// `nav.xhtml`: the EPUB 3 navigation document.
pub fn nav_xhtml(meta: &PackageMetadata, manifest: &PackageManifest) -> Result<String, Pdf2EpubError> {
    let mut doc = XmlDoc::new("OEBPS/nav.xhtml")?;
    doc.event(Event::DocType(BytesText::from_escaped("html")))?;

    let mut html = BytesStart::new("html");
    html.push_attribute(("xmlns", "http://www.w3.org/1999/xhtml"));
    html.push_attribute(("xmlns:epub", "http://www.idpf.org/2007/ops"));
    html.push_attribute(("xml:lang", meta.language.as_str()));
    html.push_attribute(("lang", meta.language.as_str()));
    doc.start(html)?;

    doc.start(BytesStart::new("head"))?;
    doc.simple(BytesStart::new("title"), &meta.title)?;
    doc.end("head")?;

    doc.start(BytesStart::new("body"))?;
    let mut nav = BytesStart::new("nav");
    nav.push_attribute(("epub:type", "toc"));
    nav.push_attribute(("id", "toc"));
    doc.start(nav)?;
    doc.simple(BytesStart::new("h1"), "Contents")?;

    doc.start(BytesStart::new("ol"))?;
    for point in manifest.nav_points() {
        doc.start(BytesStart::new("li"))?;
        let mut a = BytesStart::new("a");
        a.push_attribute(("href", point.target.as_str()));
        doc.simple(a, &point.label)?;
        doc.end("li")?;
    }
    doc.end("ol")?;

    doc.end("nav")?;
    doc.end("body")?;
    doc.end("html")?;
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> PackageMetadata {
        PackageMetadata {
            title: "Q&A notes.pdf".into(),
            language: "en".into(),
            identifier: "urn:uuid:00000000-0000-4000-8000-000000000000".into(),
            creator: "PDF to EPUB Converter".into(),
            modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn three_pages() -> PackageManifest {
        let mut m = PackageManifest::new();
        for n in 1..=3 {
            m.push_page(n);
        }
        m
    }

    #[test]
    fn sequences_stay_in_sync() {
        let m = three_pages();
        assert_eq!(m.len(), 3);
        assert_eq!(m.spine().len(), 3);
        assert_eq!(m.nav_points().len(), 3);

        let ids: Vec<&str> = m.page_items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["page_1", "page_2", "page_3"]);
        assert_eq!(m.spine(), ["page_1", "page_2", "page_3"]);
        let orders: Vec<usize> = m.nav_points().iter().map(|p| p.order).collect();
        assert_eq!(orders, [1, 2, 3]);
        assert_eq!(m.nav_points()[1].target, "page_2.xhtml");
        assert_eq!(m.nav_points()[1].label, "Page 2");
    }

    #[test]
    fn resources_do_not_touch_page_sequences() {
        let mut m = PackageManifest::new();
        m.push_page(1);
        m.push_resource("img_1".into(), "images/page_1.png".into(), "image/png");
        assert_eq!(m.len(), 1);
        assert_eq!(m.spine().len(), 1);
        assert_eq!(m.resources().len(), 1);
    }

    #[test]
    fn container_points_at_package() {
        let xml = container_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("full-path=\"OEBPS/content.opf\""));
        assert!(xml.contains("application/oebps-package+xml"));
    }

    #[test]
    fn opf_has_metadata_manifest_and_spine() {
        let opf = content_opf(&meta(), &three_pages()).unwrap();
        assert!(opf.contains("<dc:title>Q&amp;A notes.pdf</dc:title>"));
        assert!(opf.contains("<dc:language>en</dc:language>"));
        assert!(opf.contains("<dc:creator>PDF to EPUB Converter</dc:creator>"));
        assert!(opf.contains("urn:uuid:00000000-0000-4000-8000-000000000000"));
        assert!(opf.contains("2024-05-01T12:00:00Z"));
        assert!(opf.contains("<item id=\"page_2\" href=\"page_2.xhtml\" media-type=\"application/xhtml+xml\"/>"));
        assert!(opf.contains("<spine toc=\"ncx\">"));

        let p1 = opf.find("idref=\"page_1\"").unwrap();
        let p2 = opf.find("idref=\"page_2\"").unwrap();
        let p3 = opf.find("idref=\"page_3\"").unwrap();
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn ncx_carries_page_count() {
        let ncx = toc_ncx(&meta(), &three_pages()).unwrap();
        assert!(ncx.contains("name=\"dtb:totalPageCount\" content=\"3\""));
        assert!(ncx.contains("name=\"dtb:maxPageNumber\" content=\"3\""));
        assert_eq!(ncx.matches("<navPoint ").count(), 3);
        assert!(ncx.contains("playOrder=\"3\""));
    }

    #[test]
    fn nav_lists_every_page() {
        let nav = nav_xhtml(&meta(), &three_pages()).unwrap();
        assert!(nav.contains("<!DOCTYPE html>"));
        assert!(nav.contains("epub:type=\"toc\""));
        assert_eq!(nav.matches("<li>").count(), 3);
        assert!(nav.contains("<a href=\"page_3.xhtml\">Page 3</a>"));
    }
}
