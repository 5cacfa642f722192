//! Concurrent emitters racing each other and the deferred flush timer.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_delay_buffer::memory_sink::MemorySink;
use tracing_delay_buffer::timer::ManualTimerService;
use tracing_delay_buffer::{BufferedDelayHandler, LogRecord, Severity};

fn info(msg: String) -> LogRecord {
    LogRecord::new(Severity::Info, "race", msg)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_racing_capacity_flush_delivers_once() {
    for round in 0..200 {
        let sink = MemorySink::new();
        let timers = ManualTimerService::new();
        let handler = Arc::new(
            BufferedDelayHandler::builder(Arc::new(sink.clone()))
                .capacity(3)
                .delay(Duration::from_secs(1))
                .timer(Arc::new(timers.clone()))
                .build()
                .unwrap(),
        );

        handler.emit(info(format!("{}-a", round))).unwrap();
        handler.emit(info(format!("{}-b", round))).unwrap();

        thread::scope(|scope| {
            let t = timers.clone();
            scope.spawn(move || {
                t.advance(Duration::from_secs(1));
            });
            let h = Arc::clone(&handler);
            scope.spawn(move || {
                h.emit(info(format!("{}-c", round))).unwrap();
            });
        });

        handler.shutdown().await.unwrap();

        let batches = sink.batches();
        let first = &batches[0];
        assert!(first.len() == 2 || first.len() == 3, "round {}: {:?}", round, first.len());
        let messages = sink.messages();
        assert_eq!(
            messages,
            vec![
                format!("{}-a", round),
                format!("{}-b", round),
                format!("{}-c", round)
            ]
        );
        // either one batch of three, or the timer's two plus a shutdown flush of one
        assert!(batches.len() == 1 || batches.len() == 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_emitters_lose_and_duplicate_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let sink = MemorySink::new();
    let timers = ManualTimerService::new();
    let handler = Arc::new(
        BufferedDelayHandler::builder(Arc::new(sink.clone()))
            .capacity(7)
            .delay(Duration::from_millis(10))
            .flush_level(Severity::Error)
            .timer(Arc::new(timers.clone()))
            .build()
            .unwrap(),
    );

    thread::scope(|scope| {
        for t in 0..THREADS {
            let handler = Arc::clone(&handler);
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    let severity = if i % 97 == 0 { Severity::Error } else { Severity::Info };
                    let record = LogRecord::new(severity, "race", format!("{}:{}", t, i));
                    handler.emit(record).unwrap();
                    assert!(handler.len() <= 7);
                }
            });
        }
        let timers = timers.clone();
        scope.spawn(move || {
            for _ in 0..200 {
                timers.advance(Duration::from_millis(10));
                thread::yield_now();
            }
        });
    });

    handler.shutdown().await.unwrap();

    let messages = sink.messages();
    assert_eq!(messages.len(), THREADS * PER_THREAD);
    let unique: HashSet<_> = messages.iter().collect();
    assert_eq!(unique.len(), messages.len());

    // per-emitter order survives batching
    let mut last = vec![None::<usize>; THREADS];
    for message in &messages {
        let (t, i) = message.split_once(':').unwrap();
        let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
        if let Some(prev) = last[t] {
            assert!(i > prev, "thread {} went from {} to {}", t, prev, i);
        }
        last[t] = Some(i);
    }

    let stats = handler.stats();
    assert_eq!(stats.emitted, (THREADS * PER_THREAD) as u64);
    assert_eq!(stats.delivered_batches, sink.delivery_count() as u64);
    assert_eq!(stats.flushes, stats.delivered_batches);
}

#[tokio::test]
async fn test_single_emitter_order_across_triggers() {
    let sink = MemorySink::new();
    let timers = ManualTimerService::new();
    let handler = BufferedDelayHandler::builder(Arc::new(sink.clone()))
        .capacity(4)
        .delay(Duration::from_secs(1))
        .timer(Arc::new(timers.clone()))
        .build()
        .unwrap();

    let mut expected = Vec::new();
    for i in 0..50 {
        let severity = if i % 11 == 10 { Severity::Error } else { Severity::Info };
        let msg = format!("r{}", i);
        expected.push(msg.clone());
        handler.emit(LogRecord::new(severity, "order", msg)).unwrap();
        if i % 3 == 0 {
            timers.advance(Duration::from_millis(600));
        }
    }
    handler.shutdown().await.unwrap();

    assert_eq!(sink.messages(), expected);
    assert!(sink.batches().iter().all(|b| !b.is_empty() && b.len() <= 4));
}
