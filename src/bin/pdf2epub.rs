//! `pdf2epub`: command-line front end for edgequake-pdf2epub.
//!
//! Flags become a `ConversionConfig`; the finished archive is written with
//! `write_archive` and a one-line report goes to stderr.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdf2epub::{
    convert, inspect, write_archive, ConversionConfig, ConversionProgressCallback,
    DocumentMetadata, OutputFormat, PageFailurePolicy, PageImageFormat, PageMode, PageSelection,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Terminal styling ─────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Tone {
    Ok,
    Fail,
    Warn,
    Faint,
    Strong,
}

fn paint(tone: Tone, text: impl std::fmt::Display) -> String {
    let code = match tone {
        Tone::Ok => "32",
        Tone::Fail => "31",
        Tone::Warn => "33",
        Tone::Faint => "2",
        Tone::Strong => "1",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

// ── Progress reporting ───────────────────────────────────────────────────────

/// Page-by-page progress on stderr.
///
/// Pages are extracted strictly in order, so a single "page started" instant
/// is enough to time each one.
struct PageProgress {
    bar: ProgressBar,
    epoch: Instant,
    page_started_ms: AtomicU64,
}

impl PageProgress {
    fn start() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("reading PDF");
        bar.enable_steady_tick(Duration::from_millis(100));
        Arc::new(Self {
            bar,
            epoch: Instant::now(),
            page_started_ms: AtomicU64::new(0),
        })
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn page_ms(&self) -> u64 {
        self.now_ms()
            .saturating_sub(self.page_started_ms.load(Ordering::Relaxed))
    }

    fn log_page(&self, page_num: usize, total: usize, ok: bool, detail: &str) {
        let mark = if ok {
            paint(Tone::Ok, "ok  ")
        } else {
            paint(Tone::Fail, "FAIL")
        };
        self.bar.println(format!(
            "  {mark} p.{page_num:<4} of {total:<4} {detail} {}",
            paint(Tone::Faint, format!("({} ms)", self.page_ms()))
        ));
        self.bar.inc(1);
    }
}

impl ConversionProgressCallback for PageProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner} {prefix:>9} {bar:36.cyan/blue} {pos}/{len} {msg} [{elapsed}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        self.bar.set_prefix("pages");
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.page_started_ms.store(self.now_ms(), Ordering::Relaxed);
        self.bar.set_message(format!("p.{page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, body_len: usize) {
        let size = paint(Tone::Faint, format!("{body_len} B"));
        self.log_page(page_num, total, true, &size);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let first_line = error.lines().next().unwrap_or_default();
        let short: String = first_line.chars().take(72).collect();
        self.log_page(page_num, total, false, &paint(Tone::Fail, short));
    }

    fn on_packaging_start(&self, member_count: usize) {
        self.bar.set_prefix("packaging");
        self.bar.set_message(format!("{member_count} members"));
    }

    fn on_conversion_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text EPUB next to the current directory (document.epub)
  pdf2epub document.pdf

  # Choose the output file or directory
  pdf2epub document.pdf -o books/
  pdf2epub document.pdf -o books/my-book.epub

  # Fixed-layout style: every page as an image
  pdf2epub --mode image --dpi 200 scan.pdf

  # ZIP of page images instead of an EPUB
  pdf2epub --format images --image-format jpeg slides.pdf

  # Specific pages, keep going past unreadable pages
  pdf2epub --pages 1-20 --isolate-failures broken.pdf

  # Convert from URL
  pdf2epub https://arxiv.org/pdf/1706.03762 -o attention.epub

  # Inspect PDF metadata only
  pdf2epub --inspect-only document.pdf

  # Reproducible output
  pdf2epub --identifier urn:isbn:9780000000000 --modified 2024-01-01T00:00:00Z doc.pdf

  # JSON report of the conversion
  pdf2epub --json document.pdf > report.json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
  PDF2EPUB_*              Every flag, e.g. PDF2EPUB_DPI=200

SETUP:
  pdfium must be available as a shared library. It is looked up in
  PDFIUM_LIB_PATH, then the working directory, then the system library path.
  Prebuilt binaries: https://github.com/bblanchon/pdfium-binaries
"#;

/// Convert PDF files and URLs to EPUB books.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2epub",
    version,
    about = "Convert PDF files and URLs to EPUB books or page-image archives",
    long_about = "Convert PDF documents (local files or URLs) to EPUB books with one \
page per PDF page, either as extracted text or as rendered images. Can also produce a \
ZIP archive of page images.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output file, or directory to place `<name>.epub` / `<name>.zip` in.
    #[arg(short, long, env = "PDF2EPUB_OUTPUT")]
    output: Option<PathBuf>,

    /// Output container: epub or images (ZIP of page images).
    #[arg(long, env = "PDF2EPUB_FORMAT", value_enum, default_value = "epub")]
    format: FormatArg,

    /// Page content: text or image. Forced to image for --format images.
    #[arg(long, env = "PDF2EPUB_MODE", value_enum, default_value = "text")]
    mode: ModeArg,

    /// Encoding of rendered pages: png or jpeg.
    #[arg(long, env = "PDF2EPUB_IMAGE_FORMAT", value_enum, default_value = "png")]
    image_format: ImageFormatArg,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2EPUB_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Cap on the longest rendered edge, in pixels.
    #[arg(long, env = "PDF2EPUB_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "PDF2EPUB_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Pages to convert: all, 5, 3-15, or a list such as 1,4-6,9.
    #[arg(long, env = "PDF2EPUB_PAGES", default_value = "all")]
    pages: String,

    /// Replace unreadable pages with a placeholder instead of aborting.
    #[arg(long, env = "PDF2EPUB_ISOLATE_FAILURES")]
    isolate_failures: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2EPUB_PASSWORD")]
    password: Option<String>,

    /// Book title. Default: the source file name.
    #[arg(long, env = "PDF2EPUB_TITLE")]
    title: Option<String>,

    /// Language tag written to dc:language.
    #[arg(long, env = "PDF2EPUB_LANGUAGE", default_value = "en")]
    language: String,

    /// dc:creator value.
    #[arg(long, env = "PDF2EPUB_CREATOR")]
    creator: Option<String>,

    /// Package identifier. Default: a fresh urn:uuid.
    #[arg(long, env = "PDF2EPUB_IDENTIFIER")]
    identifier: Option<String>,

    /// dcterms:modified timestamp (RFC 3339). Default: now.
    #[arg(long, env = "PDF2EPUB_MODIFIED")]
    modified: Option<String>,

    /// Print a JSON report (ConversionOutput) to stdout.
    #[arg(long, env = "PDF2EPUB_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2EPUB_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2EPUB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2EPUB_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2EPUB_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Epub,
    Images,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Text,
    Image,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Epub => OutputFormat::Epub,
            FormatArg::Images => OutputFormat::ImageArchive,
        }
    }
}

impl From<ModeArg> for PageMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Text => PageMode::Text,
            ModeArg::Image => PageMode::Image,
        }
    }
}

impl From<ImageFormatArg> for PageImageFormat {
    fn from(v: ImageFormatArg) -> Self {
        match v {
            ImageFormatArg::Png => PageImageFormat::Png,
            ImageFormatArg::Jpeg => PageImageFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar owns stderr unless -v asks for logs.
    let show_progress = !(cli.quiet || cli.no_progress || cli.json);
    let level = match (cli.verbose, cli.quiet || show_progress) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    if cli.inspect_only {
        let meta = inspect(&cli.input)
            .await
            .with_context(|| format!("Could not read metadata from {}", cli.input))?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&meta)?);
        } else {
            print_metadata(&cli.input, &meta);
        }
        return Ok(());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(PageProgress::start() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let output = convert(&cli.input, &config)
        .await
        .with_context(|| format!("Could not convert {}", cli.input))?;
    let path = write_archive(&output.archive, cli.output.as_deref())
        .await
        .context("Could not write the archive")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if !cli.quiet {
        let stats = &output.stats;
        let (tone, verdict) = if stats.failed_pages == 0 {
            (Tone::Ok, "done")
        } else {
            (Tone::Warn, "done with placeholders")
        };
        eprintln!(
            "{} {} page(s), {} failed, {:.1} KiB in {} ms: {}",
            paint(tone, verdict),
            stats.processed_pages,
            stats.failed_pages,
            stats.archive_bytes as f64 / 1024.0,
            stats.total_duration_ms,
            paint(Tone::Strong, path.display()),
        );
    }

    Ok(())
}

fn print_metadata(source: &str, meta: &DocumentMetadata) {
    let rows = [
        ("source", Some(source.to_string())),
        ("title", meta.title.clone()),
        ("author", meta.author.clone()),
        ("subject", meta.subject.clone()),
        ("pages", Some(meta.page_count.to_string())),
        ("version", Some(meta.pdf_version.clone())),
        ("producer", meta.producer.clone()),
        ("creator", meta.creator.clone()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("{:>9}  {}", paint(Tone::Faint, label), value);
        }
    }
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let format = OutputFormat::from(cli.format);
    let mode = if format == OutputFormat::ImageArchive {
        PageMode::Image
    } else {
        cli.mode.into()
    };
    let policy = if cli.isolate_failures {
        PageFailurePolicy::Isolate
    } else {
        PageFailurePolicy::Abort
    };

    let mut builder = ConversionConfig::builder()
        .output_format(format)
        .page_mode(mode)
        .image_format(cli.image_format.into())
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .jpeg_quality(cli.jpeg_quality)
        .pages(parse_pages(&cli.pages)?)
        .failure_policy(policy)
        .language(cli.language.as_str())
        .download_timeout_secs(cli.download_timeout);

    builder = match &cli.password {
        Some(pwd) => builder.password(pwd.as_str()),
        None => builder,
    };
    builder = match &cli.title {
        Some(title) => builder.title(title.as_str()),
        None => builder,
    };
    builder = match &cli.creator {
        Some(creator) => builder.creator(creator.as_str()),
        None => builder,
    };
    builder = match &cli.identifier {
        Some(id) => builder.identifier(id.as_str()),
        None => builder,
    };
    if let Some(ts) = &cli.modified {
        let at = chrono::DateTime::parse_from_rfc3339(ts)
            .with_context(|| format!("--modified expects an RFC 3339 timestamp, got '{ts}'"))?;
        builder = builder.modified(at.with_timezone(&chrono::Utc));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Upper bound on the pages a comma list may expand to. A lone range is not
/// expanded and has no such limit.
const MAX_LISTED_PAGES: usize = 100_000;

/// `all`, a page (`5`), a range (`3-15`), or a comma list mixing both
/// (`1,4-6,9`). Lists keep the order given; the library sorts and dedups.
fn parse_pages(arg: &str) -> Result<PageSelection> {
    let arg = arg.trim();
    if arg.eq_ignore_ascii_case("all") {
        return Ok(PageSelection::All);
    }

    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    if let [only] = parts.as_slice() {
        return match parse_span(only)? {
            (first, last) if first == last && !only.contains('-') => {
                Ok(PageSelection::Single(first))
            }
            (first, last) => Ok(PageSelection::Range(first, last)),
        };
    }

    let spans = parts
        .into_iter()
        .map(parse_span)
        .collect::<Result<Vec<_>>>()?;
    let listed = spans
        .iter()
        .fold(0usize, |n, (first, last)| n.saturating_add(last - first + 1));
    if listed > MAX_LISTED_PAGES {
        let last = spans.iter().map(|&(_, last)| last).max().unwrap_or(1);
        bail!("page list covers {listed} pages (limit {MAX_LISTED_PAGES}); use a single range such as 1-{last}");
    }
    let pages = spans
        .into_iter()
        .flat_map(|(first, last)| first..=last)
        .collect();
    Ok(PageSelection::Set(pages))
}

fn parse_span(part: &str) -> Result<(usize, usize)> {
    let page = |s: &str| -> Result<usize> {
        let n: usize = s
            .trim()
            .parse()
            .with_context(|| format!("'{}' is not a page number", s.trim()))?;
        if n == 0 {
            bail!("page numbers start at 1");
        }
        Ok(n)
    };
    match part.split_once('-') {
        Some((a, b)) => {
            let (first, last) = (page(a)?, page(b)?);
            if first > last {
                bail!("page range {first}-{last} runs backwards");
            }
            Ok((first, last))
        }
        None => {
            let n = page(part)?;
            Ok((n, n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pages_forms() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages(" 7 ").unwrap(), PageSelection::Single(7)));
        assert!(matches!(parse_pages("2-4").unwrap(), PageSelection::Range(2, 4)));
        match parse_pages("5,1,3").unwrap() {
            PageSelection::Set(p) => assert_eq!(p, vec![5, 1, 3]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_pages_expands_mixed_lists() {
        match parse_pages("9,2-4").unwrap() {
            PageSelection::Set(p) => assert_eq!(p, vec![9, 2, 3, 4]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse_pages("ALL").unwrap(), PageSelection::All));
    }

    #[test]
    fn parse_pages_refuses_oversized_lists() {
        let err = parse_pages("1,2-900000000").unwrap_err();
        assert!(err.to_string().contains("limit"), "got: {err}");
        assert!(matches!(
            parse_pages("2-900000000").unwrap(),
            PageSelection::Range(2, 900_000_000)
        ));
        match parse_pages("1,3-100000").unwrap() {
            PageSelection::Set(p) => assert_eq!(p.len(), 99_999),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_pages_rejects_bad_input() {
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("4-2").is_err());
        assert!(parse_pages("1,x").is_err());
        assert!(parse_pages("0,2").is_err());
    }

    #[test]
    fn images_format_forces_image_mode() {
        let cli = Cli::parse_from(["pdf2epub", "--format", "images", "doc.pdf"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.output_format, OutputFormat::ImageArchive);
        assert_eq!(config.page_mode, PageMode::Image);
    }
}
