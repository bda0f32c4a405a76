//! Task-based conversion API: observe progress as a stream and cancel.
//!
//! [`spawn_conversion`] starts a conversion on the tokio runtime and returns
//! a [`ConversionTask`] right away. The task exposes:
//!
//! - [`ConversionTask::events`]: a `Stream` of [`ConversionEvent`]s, in
//!   page order, ending when the conversion ends;
//! - [`ConversionTask::cancel`]: a flag checked between pages;
//! - [`ConversionTask::join`]: the final result.
//!
//! Events are fed by the same [`ConversionProgressCallback`] hook the eager
//! API uses; a callback already present in the config still receives every
//! event.
//!
//! ```rust,no_run
//! use edgequake_pdf2epub::{spawn_conversion, ConversionConfig, ConversionEvent};
//! use futures::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut task = spawn_conversion("paper.pdf", &ConversionConfig::default());
//! while let Some(event) = task.events().next().await {
//!     if let ConversionEvent::PageCompleted { page_num, .. } = event {
//!         eprintln!("page {page_num} done");
//!     }
//! }
//! let output = task.join().await?;
//! println!("{} bytes", output.archive.len());
//! # Ok(())
//! # }
//! ```

use crate::config::ConversionConfig;
use crate::convert::{convert_pdf_blocking, run_conversion};
use crate::error::Pdf2EpubError;
use crate::output::ConversionOutput;
use crate::pipeline::input;
use crate::pipeline::load::{validate_pdf_bytes, SourceDocument};
use crate::progress::{ConversionProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// Stream of progress events for one conversion.
pub type EventStream = UnboundedReceiverStream<ConversionEvent>;

/// One step of a running conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConversionEvent {
    Started {
        total_pages: usize,
    },
    PageStarted {
        page_num: usize,
        total_pages: usize,
    },
    PageCompleted {
        page_num: usize,
        total_pages: usize,
        body_len: usize,
    },
    PageFailed {
        page_num: usize,
        total_pages: usize,
        error: String,
    },
    /// Every page is in; navigation and package documents are being written.
    Packaging {
        member_count: usize,
    },
    Finished {
        total_pages: usize,
        success_count: usize,
    },
}

/// Requests cancellation of a running conversion. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// The conversion stops before the next page and returns
    /// [`Pdf2EpubError::Cancelled`].
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A conversion running in the background.
pub struct ConversionTask {
    events: EventStream,
    cancel: CancelHandle,
    handle: JoinHandle<Result<ConversionOutput, Pdf2EpubError>>,
}

impl ConversionTask {
    /// Progress events. The stream ends when the conversion ends.
    pub fn events(&mut self) -> &mut EventStream {
        &mut self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that can cancel this task from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the conversion to finish.
    pub async fn join(self) -> Result<ConversionOutput, Pdf2EpubError> {
        self.handle
            .await
            .map_err(|e| Pdf2EpubError::Internal(format!("conversion task failed: {}", e)))?
    }
}

/// Start converting a PDF file or URL in the background.
///
/// Must be called from within a tokio runtime.
pub fn spawn_conversion(input_str: impl Into<String>, config: &ConversionConfig) -> ConversionTask {
    let input_str = input_str.into();
    let (config, events) = with_event_channel(config);
    let cancel = CancelHandle::default();
    let flag = Arc::clone(&cancel.0);

    let handle = tokio::spawn(async move {
        info!("Starting background conversion: {}", input_str);
        let source = input::resolve_input(&input_str, config.download_timeout_secs).await?;
        validate_pdf_bytes(&source.bytes, &source.file_name)?;

        tokio::task::spawn_blocking(move || {
            convert_pdf_blocking(&source.bytes, &source.file_name, &config, Some(&*flag))
        })
        .await
        .map_err(|e| Pdf2EpubError::Internal(format!("conversion task failed: {}", e)))?
    });

    ConversionTask {
        events,
        cancel,
        handle,
    }
}

/// Start converting an already loaded document in the background.
///
/// Must be called from within a tokio runtime.
pub fn spawn_document_conversion<D>(
    doc: D,
    file_name: impl Into<String>,
    config: &ConversionConfig,
) -> ConversionTask
where
    D: SourceDocument + Send + 'static,
{
    let file_name = file_name.into();
    let (config, events) = with_event_channel(config);
    let cancel = CancelHandle::default();
    let flag = Arc::clone(&cancel.0);

    let handle = tokio::task::spawn_blocking(move || {
        run_conversion(&doc, &file_name, &config, Some(&*flag))
    });

    ConversionTask {
        events,
        cancel,
        handle,
    }
}

/// Clone `config` with a callback that forwards every event to a channel.
fn with_event_channel(config: &ConversionConfig) -> (ConversionConfig, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut config = config.clone();
    let forwarder = EventForwarder {
        tx,
        inner: config.progress_callback.take(),
    };
    config.progress_callback = Some(Arc::new(forwarder) as ProgressCallback);
    (config, UnboundedReceiverStream::new(rx))
}

struct EventForwarder {
    tx: mpsc::UnboundedSender<ConversionEvent>,
    inner: Option<ProgressCallback>,
}

impl EventForwarder {
    fn send(&self, event: ConversionEvent) {
        // Receiver gone means nobody is listening; the conversion carries on.
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl ConversionProgressCallback for EventForwarder {
    fn on_conversion_start(&self, total_pages: usize) {
        self.send(ConversionEvent::Started { total_pages });
        if let Some(ref cb) = self.inner {
            cb.on_conversion_start(total_pages);
        }
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.send(ConversionEvent::PageStarted {
            page_num,
            total_pages,
        });
        if let Some(ref cb) = self.inner {
            cb.on_page_start(page_num, total_pages);
        }
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, body_len: usize) {
        self.send(ConversionEvent::PageCompleted {
            page_num,
            total_pages,
            body_len,
        });
        if let Some(ref cb) = self.inner {
            cb.on_page_complete(page_num, total_pages, body_len);
        }
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.send(ConversionEvent::PageFailed {
            page_num,
            total_pages,
            error: error.to_string(),
        });
        if let Some(ref cb) = self.inner {
            cb.on_page_error(page_num, total_pages, error);
        }
    }

    fn on_packaging_start(&self, member_count: usize) {
        self.send(ConversionEvent::Packaging { member_count });
        if let Some(ref cb) = self.inner {
            cb.on_packaging_start(member_count);
        }
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.send(ConversionEvent::Finished {
            total_pages,
            success_count,
        });
        if let Some(ref cb) = self.inner {
            cb.on_conversion_complete(total_pages, success_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageFailurePolicy;
    use crate::error::PageError;
    use crate::output::DocumentMetadata;
    use crate::pipeline::load::{InMemoryDocument, RenderOptions};
    use futures::StreamExt;
    use image::DynamicImage;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn doc(pages: usize) -> InMemoryDocument {
        (1..=pages).fold(InMemoryDocument::new(), |d, i| {
            d.with_text_page([format!("page {}", i)])
        })
    }

    /// Blocks inside page 2 until the test releases it.
    struct GatedDocument {
        inner: InMemoryDocument,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SourceDocument for GatedDocument {
        fn page_count(&self) -> usize {
            self.inner.page_count()
        }

        fn text_runs(&self, page_num: usize) -> Result<Vec<String>, PageError> {
            if page_num == 2 {
                let _ = self.gate.lock().unwrap().recv();
            }
            self.inner.text_runs(page_num)
        }

        fn render(&self, page_num: usize, options: &RenderOptions) -> Result<DynamicImage, PageError> {
            self.inner.render(page_num, options)
        }

        fn metadata(&self) -> DocumentMetadata {
            self.inner.metadata()
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_page_order() {
        let mut task = spawn_document_conversion(doc(2), "two.pdf", &ConversionConfig::default());
        let events: Vec<ConversionEvent> = task.events().collect().await;
        let output = task.join().await.unwrap();

        assert_eq!(events.first(), Some(&ConversionEvent::Started { total_pages: 2 }));
        assert_eq!(
            events.last(),
            Some(&ConversionEvent::Finished {
                total_pages: 2,
                success_count: 2
            })
        );
        let started: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ConversionEvent::PageStarted { page_num, .. } => Some(*page_num),
                _ => None,
            })
            .collect();
        assert_eq!(started, [1, 2]);
        assert!(events
            .iter()
            .any(|e| matches!(e, ConversionEvent::Packaging { .. })));
        assert_eq!(output.stats.processed_pages, 2);
    }

    #[tokio::test]
    async fn test_existing_callback_still_called() {
        struct Count(AtomicUsize);
        impl ConversionProgressCallback for Count {
            fn on_page_complete(&self, _: usize, _: usize, _: usize) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let count = Arc::new(Count(AtomicUsize::new(0)));
        let config = ConversionConfig::builder()
            .progress_callback(Arc::clone(&count) as ProgressCallback)
            .build()
            .unwrap();

        let task = spawn_document_conversion(doc(3), "three.pdf", &config);
        task.join().await.unwrap();
        assert_eq!(count.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_page_event_under_isolate() {
        let config = ConversionConfig::builder()
            .failure_policy(PageFailurePolicy::Isolate)
            .build()
            .unwrap();
        let document = InMemoryDocument::new()
            .with_text_page(["ok"])
            .with_broken_page("bad stream");
        let mut task = spawn_document_conversion(document, "x.pdf", &config);
        let events: Vec<ConversionEvent> = task.events().collect().await;
        task.join().await.unwrap();

        assert!(events.iter().any(|e| matches!(
            e,
            ConversionEvent::PageFailed { page_num: 2, error, .. } if error.contains("bad stream")
        )));
    }

    #[tokio::test]
    async fn test_cancel_between_pages() {
        let (release, gate) = std::sync::mpsc::channel();
        let document = GatedDocument {
            inner: doc(3),
            gate: Mutex::new(gate),
        };
        let mut task = spawn_document_conversion(document, "three.pdf", &ConversionConfig::default());

        // Wait until page 2 is in flight, then cancel and let it finish.
        while let Some(event) = task.events().next().await {
            if event
                == (ConversionEvent::PageStarted {
                    page_num: 2,
                    total_pages: 3,
                })
            {
                break;
            }
        }
        task.cancel();
        release.send(()).unwrap();

        let err = task.join().await.unwrap_err();
        assert!(matches!(
            err,
            Pdf2EpubError::Cancelled {
                completed: 2,
                total: 3
            }
        ));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&ConversionEvent::Packaging { member_count: 4 }).unwrap();
        assert_eq!(json, r#"{"event":"packaging","member_count":4}"#);
    }
}
