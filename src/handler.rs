use crate::buffer::Buffer;
use crate::config::HandlerConfig;
use crate::error::{ConfigError, DeliveryError, HandlerError};
use crate::record::{LogRecord, Severity};
use crate::sink::BatchSink;
use crate::timer::{TimerHandle, TimerService, TokioTimerService};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Target of the handler's own diagnostics. [`BufferedLayer`](crate::layer::BufferedLayer)
/// never buffers events with exactly this target.
pub(crate) const LOG_TARGET: &str = "tracing_delay_buffer";

/// Why a batch was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// The record just appended filled the buffer.
    Capacity,
    /// The record just appended was at or above the flush level.
    Severity,
    /// The deferred flush timer expired.
    Delay,
    /// [`BufferedDelayHandler::flush`] was called.
    Manual,
    /// Final flush performed by [`BufferedDelayHandler::shutdown`].
    Shutdown,
}

/// Callback observing failed deliveries.
pub type DeliveryErrorHook = Arc<dyn Fn(&DeliveryError) + Send + Sync>;

/// Snapshot of a handler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Records accepted by `emit`.
    pub emitted: u64,
    /// Non-empty batches drained, whatever the trigger.
    pub flushes: u64,
    /// Batches the sink accepted.
    pub delivered_batches: u64,
    /// Batches the sink rejected.
    pub failed_batches: u64,
    /// Records dropped at shutdown because `flush_on_close` was off.
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    emitted: AtomicU64,
    flushes: AtomicU64,
    delivered_batches: AtomicU64,
    failed_batches: AtomicU64,
    discarded: AtomicU64,
}

struct Batch {
    trigger: FlushTrigger,
    records: Vec<LogRecord>,
}

enum Command {
    Deliver(Batch),
    Barrier(oneshot::Sender<()>),
}

struct ArmedTimer {
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

struct State {
    buffer: Buffer,
    timer: Option<ArmedTimer>,
    generation: u64,
    /// `None` once the handler is shut down.
    outbox: Option<mpsc::UnboundedSender<Command>>,
}

struct Shared {
    config: HandlerConfig,
    timers: Arc<dyn TimerService>,
    state: Mutex<State>,
    counters: Arc<Counters>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the deferred flush. The callback only holds a weak reference, so
    /// a pending timer never keeps a dropped handler alive.
    fn arm(self: &Arc<Self>, state: &mut State, delay: Duration) {
        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<Shared> = Arc::downgrade(self);
        let handle = self.timers.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_timer(generation);
                }
            }),
        );
        state.timer = Some(ArmedTimer { generation, handle });
    }

    fn on_timer(&self, generation: u64) {
        let records = {
            let mut state = self.lock();
            // A flush that won the race already cancelled or replaced this timer.
            if state.timer.as_ref().map(|t| t.generation) != Some(generation) {
                return;
            }
            state.timer = None;
            match self.take_batch(&mut state, FlushTrigger::Delay) {
                Some(batch) => {
                    let records = batch.records.len();
                    self.dispatch(&state, batch);
                    records
                }
                None => return,
            }
        };
        tracing::debug!(target: LOG_TARGET, trigger = ?FlushTrigger::Delay, records, "flushed buffer");
    }

    /// Cancel the timer and drain the buffer. `None` if there was nothing
    /// buffered, in which case the sink is not called at all.
    fn take_batch(&self, state: &mut State, trigger: FlushTrigger) -> Option<Batch> {
        if let Some(timer) = state.timer.take() {
            timer.handle.cancel();
        }
        if state.buffer.is_empty() {
            return None;
        }
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Some(Batch {
            trigger,
            records: state.buffer.drain_all(),
        })
    }

    /// Final flush (or discard, without `flush_on_close`) followed by
    /// closing the outbox. Returns how many records were still buffered.
    fn close(&self, state: &mut State) -> usize {
        let residual = state.buffer.len();
        if self.config.flush_on_close {
            if let Some(batch) = self.take_batch(state, FlushTrigger::Shutdown) {
                self.dispatch(state, batch);
            }
        } else {
            if let Some(timer) = state.timer.take() {
                timer.handle.cancel();
            }
            let dropped = state.buffer.drain_all().len() as u64;
            self.counters.discarded.fetch_add(dropped, Ordering::Relaxed);
        }
        // Dropping the last sender lets the worker drain its queue and exit.
        state.outbox = None;
        residual
    }

    /// Queue a batch for the delivery worker. Called with the lock held so
    /// batches reach the worker in flush order.
    fn dispatch(&self, state: &State, batch: Batch) {
        let lost = batch.records.len() as u64;
        let queued = state
            .outbox
            .as_ref()
            .map(|outbox| outbox.send(Command::Deliver(batch)).is_ok())
            .unwrap_or(false);
        if !queued {
            self.counters.discarded.fetch_add(lost, Ordering::Relaxed);
        }
    }
}

async fn run_worker(
    sink: Arc<dyn BatchSink>,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    counters: Arc<Counters>,
    on_error: DeliveryErrorHook,
) {
    while let Some(command) = inbox.recv().await {
        match command {
            Command::Deliver(batch) => match sink.deliver(&batch.records).await {
                Ok(()) => {
                    counters.delivered_batches.fetch_add(1, Ordering::Relaxed);
                }
                Err(source) => {
                    counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                    on_error(&DeliveryError {
                        trigger: batch.trigger,
                        records: batch.records.len(),
                        source,
                    });
                }
            },
            Command::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn log_delivery_error(err: &DeliveryError) {
    tracing::warn!(target: LOG_TARGET, error = %err, "batch delivery failed");
}

/// Buffers records and hands them to a [`BatchSink`] in batches.
///
/// A batch is flushed when the buffer reaches its capacity, when a record
/// at or above the flush level arrives, or when the configured delay has
/// passed since the first record of the batch was buffered.
///
/// `emit` is synchronous and only does bounded work under the handler
/// lock. Sink calls happen on a background delivery task, one batch at a
/// time, in flush order.
pub struct BufferedDelayHandler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedDelayHandler {
    /// Build a handler from a configuration using the current tokio runtime.
    pub fn new(config: HandlerConfig, sink: Arc<dyn BatchSink>) -> Result<Self, ConfigError> {
        Self::builder(sink).config(config).build()
    }

    /// Start building a handler that delivers to `sink`.
    ///
    /// **Parameters**
    /// - `sink`: destination of every flushed batch. It is shared, never
    ///   owned: the handler only calls [`BatchSink::deliver`] on it.
    ///
    /// **Returns**
    /// - a [`HandlerBuilder`] preloaded with [`HandlerConfig::default`].
    pub fn builder(sink: Arc<dyn BatchSink>) -> HandlerBuilder {
        HandlerBuilder {
            sink,
            config: HandlerConfig::default(),
            timers: None,
            runtime: None,
            on_error: None,
        }
    }

    /// Buffer one record, flushing if it fills the buffer or is severe enough.
    ///
    /// **Errors**
    /// - [`HandlerError::Unavailable`] once [`shutdown`](Self::shutdown) has run.
    pub fn emit(&self, record: LogRecord) -> Result<(), HandlerError> {
        let severity = record.severity;
        let flushed = {
            let mut state = self.shared.lock();
            if state.outbox.is_none() {
                return Err(HandlerError::Unavailable);
            }
            self.shared.counters.emitted.fetch_add(1, Ordering::Relaxed);

            if state.buffer.is_empty() {
                if let Some(delay) = self.shared.config.delay {
                    self.shared.arm(&mut state, delay);
                }
            }
            state.buffer.push(record);

            let batch = self
                .trigger_for(&state, severity)
                .and_then(|trigger| self.shared.take_batch(&mut state, trigger));
            match batch {
                Some(batch) => {
                    let summary = (batch.trigger, batch.records.len());
                    self.shared.dispatch(&state, batch);
                    Some(summary)
                }
                None => None,
            }
        };

        if let Some((trigger, records)) = flushed {
            tracing::debug!(target: LOG_TARGET, ?trigger, records, "flushed buffer");
        }
        Ok(())
    }

    /// Capacity wins over severity when one record satisfies both.
    fn trigger_for(&self, state: &State, severity: Severity) -> Option<FlushTrigger> {
        if state.buffer.is_full() {
            Some(FlushTrigger::Capacity)
        } else if severity >= self.shared.config.flush_level {
            Some(FlushTrigger::Severity)
        } else {
            None
        }
    }

    /// Drain the buffer now and wait until the sink has seen every batch
    /// drained so far.
    pub async fn flush(&self) -> Result<(), HandlerError> {
        let done = {
            let mut state = self.shared.lock();
            let outbox = state.outbox.clone().ok_or(HandlerError::Unavailable)?;
            if let Some(batch) = self.shared.take_batch(&mut state, FlushTrigger::Manual) {
                self.shared.dispatch(&state, batch);
            }
            let (tx, rx) = oneshot::channel();
            let _ = outbox.send(Command::Barrier(tx));
            rx
        };
        let _ = done.await;
        Ok(())
    }

    /// Wait until the sink has seen every batch drained before this call,
    /// without flushing anything.
    pub async fn barrier(&self) -> Result<(), HandlerError> {
        let done = {
            let state = self.shared.lock();
            let outbox = state.outbox.as_ref().ok_or(HandlerError::Unavailable)?;
            let (tx, rx) = oneshot::channel();
            let _ = outbox.send(Command::Barrier(tx));
            rx
        };
        let _ = done.await;
        Ok(())
    }

    /// Cancel the timer, flush what is left (unless `flush_on_close` is
    /// off), and wait for the delivery worker to finish.
    ///
    /// **Errors**
    /// - [`HandlerError::Unavailable`] if the handler was already shut down.
    pub async fn shutdown(&self) -> Result<(), HandlerError> {
        let residual = {
            let mut state = self.shared.lock();
            if state.outbox.is_none() {
                return Err(HandlerError::Unavailable);
            }
            self.shared.close(&mut state)
        };

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(target: LOG_TARGET, error = %err, "delivery worker ended abnormally");
            }
        }

        tracing::debug!(
            target: LOG_TARGET,
            residual,
            flushed = self.shared.config.flush_on_close,
            "handler shut down"
        );
        Ok(())
    }

    /// The configuration the handler was built with. Fixed for its lifetime.
    pub fn config(&self) -> &HandlerConfig {
        &self.shared.config
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /// `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().buffer.is_empty()
    }

    /// Whether a deferred flush is currently pending.
    pub fn is_timer_armed(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().outbox.is_none()
    }

    /// Snapshot of the handler's counters.
    ///
    /// **Returns**
    /// - a [`HandlerStats`] copy. Delivery counts lag behind `flushes`
    ///   until the worker has processed the queued batches; await
    ///   [`barrier`](Self::barrier) first for an exact picture.
    pub fn stats(&self) -> HandlerStats {
        let c = &self.shared.counters;
        HandlerStats {
            emitted: c.emitted.load(Ordering::Relaxed),
            flushes: c.flushes.load(Ordering::Relaxed),
            delivered_batches: c.delivered_batches.load(Ordering::Relaxed),
            failed_batches: c.failed_batches.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Dropping a handler that was not shut down still runs the final flush.
/// The detached worker delivers it in the background as long as its
/// runtime is alive; nothing waits for it.
impl Drop for BufferedDelayHandler {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.outbox.is_some() {
            let residual = self.shared.close(&mut state);
            drop(state);
            if residual > 0 {
                tracing::debug!(target: LOG_TARGET, residual, "handler dropped without shutdown");
            }
        }
    }
}

/// Builder for [`BufferedDelayHandler`].
pub struct HandlerBuilder {
    sink: Arc<dyn BatchSink>,
    config: HandlerConfig,
    timers: Option<Arc<dyn TimerService>>,
    runtime: Option<Handle>,
    on_error: Option<DeliveryErrorHook>,
}

impl HandlerBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of records that fills the buffer. Must be greater than zero.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Flush this long after the first record of a batch was buffered.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = Some(delay);
        self
    }

    /// Disable the delay trigger.
    pub fn no_delay(mut self) -> Self {
        self.config.delay = None;
        self
    }

    /// Records at or above `level` flush immediately.
    pub fn flush_level(mut self, level: Severity) -> Self {
        self.config.flush_level = level;
        self
    }

    /// Whether shutdown (or drop) flushes residual records or discards them.
    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.config.flush_on_close = flush;
        self
    }

    /// Use a specific timer service instead of tokio timers.
    pub fn timer(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Runtime that hosts the delivery worker (and tokio timers).
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Observe failed deliveries. By default they are logged at `WARN`.
    pub fn on_delivery_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DeliveryError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration and spawn the delivery worker.
    ///
    /// **Errors**
    /// - [`ConfigError::ZeroCapacity`] for a zero capacity.
    /// - [`ConfigError::NoRuntime`] if no runtime was given and the caller
    ///   is not inside one.
    pub fn build(self) -> Result<BufferedDelayHandler, ConfigError> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };
        let timers: Arc<dyn TimerService> = match self.timers {
            Some(timers) => timers,
            None => Arc::new(TokioTimerService::new(runtime.clone())),
        };
        let on_error: DeliveryErrorHook = match self.on_error {
            Some(hook) => hook,
            None => Arc::new(log_delivery_error),
        };

        let (outbox, inbox) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = runtime.spawn(run_worker(
            self.sink,
            inbox,
            Arc::clone(&counters),
            on_error,
        ));

        let state = State {
            buffer: Buffer::new(self.config.capacity),
            timer: None,
            generation: 0,
            outbox: Some(outbox),
        };

        Ok(BufferedDelayHandler {
            shared: Arc::new(Shared {
                config: self.config,
                timers,
                state: Mutex::new(state),
                counters,
            }),
            worker: Mutex::new(Some(worker)),
        })
    }
}
