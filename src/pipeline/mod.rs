//! Pipeline stages for PDF-to-EPUB conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. The PDF engine sits behind [`load::SourceDocument`], so everything
//! downstream of loading runs against an in-memory document in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ load ──▶ extract ──▶ archive ──▶ bytes / file
//! (URL/path) (pdfium) (text|image) (zip)
//!                       │           ▲
//!                       ▼           │
//!                     encode     package + markup
//!                    (png/jpeg)  (opf, ncx, nav, xhtml)
//! ```
//!
//! 1. [`input`]  : read a local path or download a URL into memory
//! 2. [`load`]   : validate and open the buffer; pdfium is not async-safe,
//!    so callers run this and everything after it in `spawn_blocking`
//! 3. [`extract`]: visit selected pages in order, yielding text or images
//! 4. [`encode`] : PNG/JPEG-encode rendered pages
//! 5. [`markup`] : per-page XHTML documents
//! 6. [`package`]: manifest, spine, navigation and the package documents
//! 7. [`archive`]: stream members into the final ZIP

pub mod archive;
pub mod encode;
pub mod extract;
pub mod input;
pub mod load;
pub mod markup;
pub mod package;
