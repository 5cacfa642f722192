use crate::record::LogRecord;
use crate::sink::BatchSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops every batch.
///
/// Useful for measuring the overhead of buffering without any external I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl BatchSink for NoopSink {
    async fn deliver(&self, _batch: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
