use crate::handler::{BufferedDelayHandler, LOG_TARGET};
use crate::record::{LogRecord, Severity};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// routes them to a [`BufferedDelayHandler`].
///
/// Events below `capture_level` are ignored, as are the handler's own
/// diagnostics, so they cannot feed back into the buffer. Records rejected by a closed
/// handler are counted and dropped.
pub struct BufferedLayer {
    handler: Arc<BufferedDelayHandler>,
    capture_level: Severity,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Accepted by the handler.
    pub buffered_events: Arc<AtomicU64>,
    /// Rejected because the handler was shut down.
    pub rejected_events: Arc<AtomicU64>,
}

impl BufferedLayer {
    pub fn new(handler: Arc<BufferedDelayHandler>, capture_level: Severity) -> Self {
        Self {
            handler,
            capture_level,
            total_events: Arc::new(AtomicU64::new(0)),
            buffered_events: Arc::new(AtomicU64::new(0)),
            rejected_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handler(&self) -> &Arc<BufferedDelayHandler> {
        &self.handler
    }
}

impl<S> Layer<S> for BufferedLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let severity = Severity::from(meta.level());
        if severity < self.capture_level || meta.target() == LOG_TARGET {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now(),
            severity,
            target: meta.target().to_string(),
            module_path: meta.module_path().map(|s| s.to_string()),
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            fields,
            message,
        };

        match self.handler.emit(record) {
            Ok(()) => {
                self.buffered_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.rejected_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // `message` from format_args! arrives here rather than in record_str.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_sink::MemorySink;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn converts_events_and_skips_low_levels() {
        let sink = MemorySink::new();
        let handler = Arc::new(
            BufferedDelayHandler::builder(Arc::new(sink.clone()))
                .capacity(10)
                .no_delay()
                .build()
                .unwrap(),
        );
        let layer = BufferedLayer::new(Arc::clone(&handler), Severity::Info);
        let total = Arc::clone(&layer.total_events);
        let buffered = Arc::clone(&layer.buffered_events);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "auth", "too quiet");
            tracing::info!(target: "auth", user_id = 42, ok = true, "user {} logged in", "ann");
            tracing::error!(target: "tracing_delay_buffer", "internal error");
            tracing::error!(target: "auth", code = 500u64, "request failed");
        });

        handler.barrier().await.unwrap();
        assert!(total.load(Ordering::Relaxed) >= 4);
        assert_eq!(buffered.load(Ordering::Relaxed), 2);

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch[0].target, "auth");
        assert_eq!(batch[0].message.as_deref(), Some("user ann logged in"));
        assert_eq!(batch[0].fields["user_id"], 42);
        assert_eq!(batch[0].fields["ok"], true);
        assert_eq!(batch[1].severity, Severity::Error);
        assert_eq!(batch[1].fields["code"], 500);
    }

    #[tokio::test]
    async fn only_exact_diagnostic_target_is_skipped() {
        let sink = MemorySink::new();
        let handler = Arc::new(
            BufferedDelayHandler::builder(Arc::new(sink.clone()))
                .capacity(10)
                .no_delay()
                .build()
                .unwrap(),
        );
        let layer = BufferedLayer::new(Arc::clone(&handler), Severity::Info);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            // default target is this module's path, inside the crate
            tracing::info!("from crate module");
            tracing::info!(target: "tracing_delay_buffer_ext", "from similarly named crate");
            tracing::info!(target: "tracing_delay_buffer::handler", "from submodule target");
            tracing::info!(target: "tracing_delay_buffer", "diagnostic");
        });

        handler.flush().await.unwrap();
        assert_eq!(
            sink.messages(),
            vec!["from crate module", "from similarly named crate", "from submodule target"]
        );
    }

    #[tokio::test]
    async fn events_after_shutdown_are_rejected() {
        let handler = Arc::new(
            BufferedDelayHandler::builder(Arc::new(MemorySink::new()))
                .build()
                .unwrap(),
        );
        let layer = BufferedLayer::new(Arc::clone(&handler), Severity::Trace);
        let rejected = Arc::clone(&layer.rejected_events);
        handler.shutdown().await.unwrap();

        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "auth", "nobody listens");
        });

        assert_eq!(rejected.load(Ordering::Relaxed), 1);
    }
}
