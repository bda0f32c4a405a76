//! Page-level progress hooks.
//!
//! A [`ConversionProgressCallback`] set on the config sees the pipeline from
//! the inside: the page count once the PDF is open, each page as it starts and
//! finishes (or fails), then the packaging step. Hooks run on the blocking
//! worker that drives the conversion, hence the `Send + Sync` bound.
//! [`crate::stream`] builds its event stream on top of this trait.
//!
//! ```rust
//! use edgequake_pdf2epub::{ConversionConfig, ConversionProgressCallback, ProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct BytesSeen(AtomicUsize);
//!
//! impl ConversionProgressCallback for BytesSeen {
//!     fn on_page_complete(&self, _page: usize, _total: usize, body_len: usize) {
//!         self.0.fetch_add(body_len, Ordering::Relaxed);
//!     }
//! }
//!
//! let seen: ProgressCallback = Arc::new(BytesSeen::default());
//! let config = ConversionConfig::builder()
//!     .progress_callback(seen)
//!     .build()
//!     .unwrap();
//! # let _ = config;
//! ```

use std::sync::Arc;

/// Observer of a running conversion. Every hook defaults to doing nothing.
///
/// Page numbers are the 1-indexed PDF page numbers, reported in ascending
/// order; `total_pages` is the size of the selection, not of the document.
pub trait ConversionProgressCallback: Send + Sync {
    /// The document is open and `total_pages` pages are about to be read.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// `body_len` is the size of the page payload: UTF-8 text bytes in text
    /// mode, encoded image bytes in image mode.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, body_len: usize) {
        let _ = (page_num, total_pages, body_len);
    }

    /// Under `PageFailurePolicy::Abort` no further page hooks follow.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// All pages are visited; `member_count` archive members exist so far and
    /// the navigation and package documents are next.
    fn on_packaging_start(&self, member_count: usize) {
        let _ = member_count;
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every hook as a short line, in call order.
    #[derive(Default)]
    struct Transcript(Mutex<Vec<String>>);

    impl Transcript {
        fn push(&self, line: String) {
            self.0.lock().unwrap().push(line);
        }

        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ConversionProgressCallback for Transcript {
        fn on_page_start(&self, page_num: usize, total_pages: usize) {
            self.push(format!("start {page_num}/{total_pages}"));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
            self.push(format!("error {page_num}: {error}"));
        }

        fn on_packaging_start(&self, member_count: usize) {
            self.push(format!("package {member_count}"));
        }
    }

    #[test]
    fn unimplemented_hooks_are_silent() {
        let t = Transcript::default();
        t.on_conversion_start(3);
        t.on_page_complete(1, 3, 10);
        t.on_conversion_complete(3, 3);
        assert!(t.lines().is_empty());
    }

    #[test]
    fn overridden_hooks_see_arguments_in_order() {
        let t = Transcript::default();
        t.on_page_start(4, 2);
        t.on_page_start(9, 2);
        t.on_page_error(9, 2, "bad xref");
        t.on_packaging_start(5);
        assert_eq!(
            t.lines(),
            ["start 4/2", "start 9/2", "error 9: bad xref", "package 5"]
        );
    }

    #[test]
    fn noop_behind_shared_handle() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        let other = Arc::clone(&cb);
        other.on_page_error(1, 1, "ignored");
        assert_eq!(Arc::strong_count(&cb), 2);
    }
}
