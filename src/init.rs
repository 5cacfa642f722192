use crate::config::HandlerConfig;
use crate::error::InitError;
use crate::handler::BufferedDelayHandler;
use crate::layer::BufferedLayer;
use crate::record::Severity;
use crate::sink::BatchSink;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the global buffering layer.
///
/// **Fields**
/// - `handler`: [`HandlerConfig`] for the buffer (capacity, delay, flush
///   level, flush on close).
/// - `capture_level`: lowest severity routed into the buffer.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`BufferedLayer`] so events are also printed as they happen.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub handler: HandlerConfig,
    pub capture_level: Severity,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            handler: HandlerConfig::default(),
            capture_level: Severity::Info,
            enable_stdout: true,
        }
    }
}

/// Initialize the global `tracing` subscriber with a buffering layer in
/// front of `sink`.
///
/// **Returns**
/// - the [`BufferedDelayHandler`] behind the layer. Call
///   [`shutdown`](BufferedDelayHandler::shutdown) on it before exiting so
///   buffered records are not lost.
///
/// **Errors**
/// - [`InitError::Config`] if the configuration is invalid or there is no
///   current tokio runtime.
/// - [`InitError::SetGlobal`] if a global subscriber is already installed.
pub fn init_tracing_with_config(
    sink: Arc<dyn BatchSink>,
    config: LayerConfig,
) -> Result<Arc<BufferedDelayHandler>, InitError> {
    let handler = Arc::new(BufferedDelayHandler::new(config.handler, sink)?);
    let layer = BufferedLayer::new(Arc::clone(&handler), config.capture_level);

    // Two subscriber shapes, since `with(fmt_layer)` changes the type.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(handler)
}

/// Initialize tracing with [`LayerConfig::default`]: 32 records, 10 s
/// delay, flush on `ERROR`.
pub fn init_tracing(sink: Arc<dyn BatchSink>) -> Result<Arc<BufferedDelayHandler>, InitError> {
    init_tracing_with_config(sink, LayerConfig::default())
}
