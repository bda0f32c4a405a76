//! Markup helpers: escaping extracted text and building XHTML page bodies.
//!
//! Page text comes straight out of the PDF engine and may contain anything:
//! `&` and `<` that would break the XHTML parser in every reading system,
//! and C0 control characters that XML 1.0 forbids outright. Each helper
//! here is a pure `&str → String` function so it can be tested without a
//! document.
//!
//! Only `&`, `<` and `>` are escaped in text content. Quotes are legal in
//! element text, and leaving them alone keeps escaping the identity for
//! text that contains none of the three markup characters.

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape, unescape, EscapeError};
use regex::Regex;

/// Human-readable label used for headings, titles and navigation entries.
pub fn page_label(page_num: usize) -> String {
    format!("Page {}", page_num)
}

/// Escape the three markup-significant characters (`&`, `<`, `>`).
pub fn escape_text(text: &str) -> String {
    partial_escape(text).into_owned()
}

/// Reverse [`escape_text`] (and any other predefined or numeric entity).
pub fn unescape_text(text: &str) -> Result<String, EscapeError> {
    unescape(text).map(|s| s.into_owned())
}

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Remove every tag, keeping text content (still escaped).
pub fn strip_tags(markup: &str) -> String {
    RE_TAG.replace_all(markup, "").to_string()
}

static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<p>(.*?)</p>").unwrap());

/// Text of the first `<p>` of a page body, unescaped.
///
/// Returns `None` when the body has no paragraph (image pages).
pub fn paragraph_text(body: &str) -> Option<String> {
    let caps = RE_PARAGRAPH.captures(body)?;
    let inner = strip_tags(&caps[1]);
    unescape_text(&inner).ok()
}

static RE_XML_ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x{FFFE}\x{FFFF}]").unwrap());

/// Drop characters that are not allowed anywhere in an XML 1.0 document.
pub fn sanitize_xml_chars(text: &str) -> String {
    RE_XML_ILLEGAL.replace_all(text, "").to_string()
}

/// XHTML body for a text page: a page-number heading and one paragraph.
///
/// Empty text still produces an (empty) paragraph so every page body has
/// the same shape.
pub fn page_body_xhtml(page_num: usize, text: &str, lang: &str) -> String {
    let label = page_label(page_num);
    let body = format!("<h1>{}</h1>\n<p>{}</p>", label, escape_text(text));
    xhtml_document(&label, &body, lang)
}

/// XHTML body for an image page: a single full-page `<img>`.
pub fn image_page_xhtml(page_num: usize, image_href: &str, lang: &str) -> String {
    let label = page_label(page_num);
    let body = format!(
        "<div class=\"page-image\">\n<img src=\"{}\" alt=\"{}\"/>\n</div>",
        escape(image_href),
        label
    );
    xhtml_document(&label, &body, lang)
}

/// XHTML body standing in for a page that could not be extracted.
pub fn placeholder_page_xhtml(page_num: usize, reason: &str, lang: &str) -> String {
    let label = page_label(page_num);
    let body = format!(
        "<h1>{}</h1>\n<p class=\"extraction-failed\">{}</p>",
        label,
        escape_text(&sanitize_xml_chars(reason))
    );
    xhtml_document(&label, &body, lang)
}

fn xhtml_document(title: &str, body: &str, lang: &str) -> String {
    let lang = escape(lang);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"{lang}\" lang=\"{lang}\">\n\
<head>\n<title>{title}</title>\n</head>\n\
<body>\n{body}\n</body>\n\
</html>\n",
        lang = lang,
        title = escape_text(title),
        body = body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markup_chars() {
        assert_eq!(escape_text("A & B"), "A &amp; B");
        assert_eq!(escape_text("<tag>"), "&lt;tag&gt;");
        assert_eq!(escape_text(""), "");
    }

    #[test]
    fn test_escape_identity_without_markup_chars() {
        for s in ["plain text", "quotes \" and ' stay", "ünïcödé — ok", ""] {
            assert_eq!(escape_text(s), s);
            assert_eq!(escape_text(&escape_text(s)), s);
        }
    }

    #[test]
    fn test_escape_then_strip_recovers_text() {
        for s in ["A & B", "<tag>", "x < y && y > z", "<<>>&&", "a &amp; b"] {
            let body = page_body_xhtml(1, s, "en");
            assert_eq!(paragraph_text(&body).as_deref(), Some(s), "input {s:?}");
        }
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>hi <b>there</b></p>"), "hi there");
        assert_eq!(strip_tags("&lt;tag&gt;"), "&lt;tag&gt;");
    }

    #[test]
    fn test_sanitize_xml_chars() {
        assert_eq!(sanitize_xml_chars("a\u{0}b\u{1F}c"), "abc");
        assert_eq!(sanitize_xml_chars("tab\tnl\ncr\r"), "tab\tnl\ncr\r");
        assert_eq!(sanitize_xml_chars("x\u{FFFE}y"), "xy");
    }

    #[test]
    fn test_page_body_shape() {
        let body = page_body_xhtml(3, "A & B", "en");
        assert!(body.starts_with("<?xml version=\"1.0\""));
        assert!(body.contains("<title>Page 3</title>"));
        assert!(body.contains("<h1>Page 3</h1>"));
        assert!(body.contains("<p>A &amp; B</p>"));
    }

    #[test]
    fn test_empty_page_has_empty_paragraph() {
        let body = page_body_xhtml(1, "", "en");
        assert!(body.contains("<p></p>"));
        assert_eq!(paragraph_text(&body).as_deref(), Some(""));
    }

    #[test]
    fn test_image_page_has_no_paragraph() {
        let body = image_page_xhtml(2, "images/page_2.png", "en");
        assert!(body.contains("<img src=\"images/page_2.png\" alt=\"Page 2\"/>"));
        assert_eq!(paragraph_text(&body), None);
    }

    #[test]
    fn test_placeholder_escapes_reason() {
        let body = placeholder_page_xhtml(5, "bad <stream> & more", "de");
        assert!(body.contains("bad &lt;stream&gt; &amp; more"));
        assert!(body.contains("xml:lang=\"de\""));
    }
}
