//! Span sinks.
//!
//! # Responsibilities
//! - Accept finished spans from the request path without blocking it
//! - Ship them to a collector (HTTP) or the process log
//! - Flush outstanding spans on close
//!
//! # Design Decisions
//! - The HTTP reporter hands spans to a bounded queue drained by a single
//!   background task. A full queue drops the span and counts it.
//! - Batches are flushed on size or on a timer, whichever comes first.

use std::sync::Mutex;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::tracer::serializer::{SerializeError, SpanSerializer};
use crate::tracer::span::SpanModel;

/// Target used by the log reporter, so spans can be filtered separately.
pub const SPAN_LOG_TARGET: &str = "mesh_agent::spans";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("http reporter must be started inside a tokio runtime")]
    NoRuntime,

    #[error("encode spans failed: {0}")]
    Serialize(#[from] SerializeError),

    #[error("post spans failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reporter worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Destination for finished spans.
pub trait Reporter: Send + Sync {
    /// Must not block.
    fn send(&self, span: SpanModel);

    /// Flush buffered spans and stop accepting new ones.
    fn close(&self) -> BoxFuture<'_, Result<(), ReportError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Writes each span as pretty JSON to the log.
pub struct LogReporter {
    serializer: SpanSerializer,
}

impl LogReporter {
    pub fn new(serializer: SpanSerializer) -> Self {
        Self { serializer }
    }
}

impl Reporter for LogReporter {
    fn send(&self, span: SpanModel) {
        match self.serializer.to_value(&span) {
            Ok(value) => {
                let body = serde_json::to_string_pretty(&value).unwrap_or_default();
                tracing::info!(target: SPAN_LOG_TARGET, trace_id = %span.context.trace_id, "{body}");
                metrics::record_span_reported(1);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping span that cannot be encoded"),
        }
    }
}

/// Keeps spans in memory. Used by tests and embedders that inspect spans.
#[derive(Default)]
pub struct MemoryReporter {
    spans: Mutex<Vec<SpanModel>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spans(&self) -> Vec<SpanModel> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl Reporter for MemoryReporter {
    fn send(&self, span: SpanModel) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Settings for [`HttpReporter`].
#[derive(Debug, Clone)]
pub struct HttpReporterConfig {
    pub url: String,
    pub auth: Option<BasicAuth>,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub queue_capacity: usize,
}

impl HttpReporterConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
            batch_size: 100,
            batch_interval: Duration::from_secs(1),
            queue_capacity: 10_000,
        }
    }
}

/// Posts span batches to a Zipkin-compatible collector.
pub struct HttpReporter {
    sender: ArcSwapOption<mpsc::Sender<SpanModel>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HttpReporter {
    /// Start the background worker on the current tokio runtime.
    pub fn spawn(
        config: HttpReporterConfig,
        client: reqwest::Client,
        serializer: SpanSerializer,
    ) -> Result<Self, ReportError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ReportError::NoRuntime)?;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let worker = BatchWorker {
            client,
            serializer,
            config,
        };
        let task = handle.spawn(worker.run(rx));

        Ok(Self {
            sender: ArcSwapOption::from_pointee(tx),
            worker: tokio::sync::Mutex::new(Some(task)),
        })
    }
}

impl Reporter for HttpReporter {
    fn send(&self, span: SpanModel) {
        let guard = self.sender.load();
        let Some(sender) = (*guard).as_deref() else {
            metrics::record_span_dropped(1);
            return;
        };
        if sender.try_send(span).is_err() {
            metrics::record_span_dropped(1);
            tracing::debug!("Span queue full or closed, dropping span");
        }
    }

    fn close(&self) -> BoxFuture<'_, Result<(), ReportError>> {
        Box::pin(async move {
            // Dropping the last sender ends the worker once the queue drains.
            self.sender.store(None);
            let task = self.worker.lock().await.take();
            if let Some(task) = task {
                task.await?;
            }
            Ok(())
        })
    }
}

struct BatchWorker {
    client: reqwest::Client,
    serializer: SpanSerializer,
    config: HttpReporterConfig,
}

impl BatchWorker {
    async fn run(self, mut rx: mpsc::Receiver<SpanModel>) {
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut ticker = tokio::time::interval(self.config.batch_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                span = rx.recv() => match span {
                    Some(span) => {
                        batch.push(span);
                        if batch.len() >= batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        self.flush(&mut batch).await;
                        break;
                    }
                },
                _ = ticker.tick() => self.flush(&mut batch).await,
            }
        }
        tracing::debug!(url = %self.config.url, "Span reporter stopped");
    }

    async fn flush(&self, batch: &mut Vec<SpanModel>) {
        if batch.is_empty() {
            return;
        }
        let spans = std::mem::take(batch);
        let count = spans.len();

        match self.post(&spans).await {
            Ok(()) => {
                metrics::record_report_batch("success");
                metrics::record_span_reported(count as u64);
            }
            Err(e) => {
                metrics::record_report_batch("failure");
                metrics::record_span_dropped(count as u64);
                tracing::warn!(url = %self.config.url, spans = count, error = %e, "Failed to report spans");
            }
        }
    }

    async fn post(&self, spans: &[SpanModel]) -> Result<(), ReportError> {
        let body = self.serializer.serialize(spans)?;
        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, self.serializer.content_type())
            .body(body);
        if let Some(auth) = &self.config.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::context::{SpanContext, SpanId, TraceId};
    use std::time::UNIX_EPOCH;

    fn span() -> SpanModel {
        SpanModel {
            context: SpanContext {
                trace_id: TraceId::new(0, 1),
                span_id: SpanId(1),
                parent_id: None,
                sampled: Some(true),
                debug: false,
            },
            name: "op".to_string(),
            kind: None,
            timestamp: UNIX_EPOCH,
            duration: Duration::from_millis(1),
            shared: false,
            local_endpoint: None,
            remote_endpoint: None,
            annotations: Vec::new(),
            tags: Default::default(),
        }
    }

    #[test]
    fn test_memory_reporter() {
        let reporter = MemoryReporter::new();
        reporter.send(span());
        assert_eq!(reporter.spans().len(), 1);
        reporter.clear();
        assert!(reporter.spans().is_empty());
    }

    #[test]
    fn test_http_reporter_needs_runtime() {
        let result = HttpReporter::spawn(
            HttpReporterConfig::new("http://127.0.0.1:9/report"),
            reqwest::Client::new(),
            SpanSerializer::new("s", "t"),
        );
        assert!(matches!(result, Err(ReportError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_http_reporter_close_drains() {
        let reporter = HttpReporter::spawn(
            HttpReporterConfig {
                batch_interval: Duration::from_secs(60),
                ..HttpReporterConfig::new("http://127.0.0.1:9/report")
            },
            reqwest::Client::new(),
            SpanSerializer::new("s", "t"),
        )
        .unwrap();

        reporter.send(span());
        reporter.close().await.unwrap();
        // Second close is a no-op and sends after close are dropped.
        reporter.close().await.unwrap();
        reporter.send(span());
    }
}
