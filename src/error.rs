use std::error::Error;

use crate::handler::FlushTrigger;

/// Error returned when a handler cannot be built from its configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    #[error("no tokio runtime available to run the delivery worker")]
    NoRuntime,

    #[error("unknown severity level: {0:?}")]
    UnknownSeverity(String),

    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Error returned by handler operations at runtime.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler has been shut down; stop routing events to it.
    #[error("handler is closed")]
    Unavailable,
}

/// A batch the sink failed to deliver.
///
/// Only ever passed to the delivery-error hook. The batch is not retried.
#[derive(thiserror::Error, Debug)]
#[error("failed to deliver batch of {records} record(s) flushed by {trigger:?}: {source}")]
pub struct DeliveryError {
    pub trigger: FlushTrigger,
    pub records: usize,
    #[source]
    pub source: Box<dyn Error + Send + Sync>,
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}
