use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::{error, info};

use tracing_delay_buffer::init::{init_tracing_with_config, LayerConfig};
use tracing_delay_buffer::noop_sink::NoopSink;
use tracing_delay_buffer::{HandlerConfig, Severity};

#[tokio::main]
async fn main() {
    let sink = Arc::new(NoopSink::default());

    let layer_config = LayerConfig {
        handler: HandlerConfig {
            capacity: 1_000,
            delay: Some(Duration::from_millis(200)),
            flush_level: Severity::Critical,
            flush_on_close: true,
        },
        capture_level: Severity::Info,
        enable_stdout: false,
    };

    let handler = init_tracing_with_config(sink, layer_config).expect("install tracing");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        if i % 10_000 == 0 {
            error!(iteration = i, "custom load test error");
        } else {
            info!(iteration = i, "custom load test event");
        }
    }

    let elapsed = start.elapsed();
    println!("custom config: buffered {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handler.shutdown().await.expect("shutdown");
    println!("stats: {:?}", handler.stats());
}
