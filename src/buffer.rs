use crate::record::LogRecord;

/// Ordered, bounded sequence of [`LogRecord`]s.
///
/// Has no locking of its own; the owning handler serializes access and
/// flushes as soon as a push fills it, so `len() <= capacity()` holds
/// between operations.
#[derive(Debug)]
pub struct Buffer {
    records: Vec<LogRecord>,
    capacity: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record. The caller must not push into a full buffer.
    pub fn push(&mut self, record: LogRecord) {
        debug_assert!(self.records.len() < self.capacity, "push into a full buffer");
        self.records.push(record);
    }

    /// Take every buffered record in insertion order, leaving the buffer empty.
    pub fn drain_all(&mut self) -> Vec<LogRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Severity;

    fn rec(msg: &str) -> LogRecord {
        LogRecord::new(Severity::Info, "test", msg)
    }

    #[test]
    fn drain_preserves_insertion_order() {
        let mut buffer = Buffer::new(3);
        buffer.push(rec("a"));
        buffer.push(rec("b"));
        assert!(!buffer.is_full());

        buffer.push(rec("c"));
        assert!(buffer.is_full());

        let drained: Vec<_> = buffer
            .drain_all()
            .into_iter()
            .map(|r| r.message.unwrap())
            .collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    fn draining_empty_buffer_is_a_noop() {
        let mut buffer = Buffer::new(1);
        assert!(buffer.drain_all().is_empty());
        assert_eq!(buffer.len(), 0);
    }
}
