pub mod record;
pub mod buffer;
pub mod sink;
pub mod timer;
pub mod handler;
pub mod layer;
pub mod error;
pub mod config;
pub mod env;
pub mod format;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod init;
pub mod memory_sink;
pub mod noop_sink;
pub mod writer_sink;

pub use config::HandlerConfig;
pub use error::{ConfigError, DeliveryError, HandlerError};
pub use handler::{BufferedDelayHandler, FlushTrigger, HandlerStats};
pub use record::{LogRecord, Severity};
pub use sink::BatchSink;
