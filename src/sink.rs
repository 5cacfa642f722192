use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for batches of [`LogRecord`]s flushed by a
/// [`BufferedDelayHandler`](crate::handler::BufferedDelayHandler).
///
/// Implementations turn one batch into one outbound unit (an email, an
/// HTTP insert, a block of text) and hand it to their transport.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Deliver one batch, in order.
    ///
    /// **Parameters**
    /// - `batch`: the drained records, never empty, oldest first.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the batch.
    /// - `Err(..)` if the backend failed. The handler reports the error to
    ///   its delivery-error hook and drops the batch; there is no retry.
    ///
    /// Called from the handler's delivery worker task, one batch at a time
    /// and never while the handler lock is held, so implementations may
    /// take their time or log through `tracing` themselves.
    async fn deliver(&self, batch: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>>;
}
