use crate::record::LogRecord;
use crate::sink::BatchSink;
use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory sink that keeps every delivered batch.
///
/// Clones share the same storage, so a test can keep one clone and hand
/// another to the handler. It can be switched into a failing mode to
/// simulate a broken transport; failed batches are counted but not stored.
#[derive(Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every delivery fails until [`set_failing(false)`](Self::set_failing).
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successfully delivered batch, in delivery order.
    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successfully delivered batches.
    pub fn delivery_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of `deliver` calls, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages of all delivered records, batches concatenated.
    pub fn messages(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flatten()
            .map(|r| r.message.clone().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn deliver(&self, batch: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(format!("memory sink refused batch of {} record(s)", batch.len()).into());
        }
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.to_vec());
        Ok(())
    }
}
