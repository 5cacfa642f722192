use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use tracing_delay_buffer::init::init_tracing;
use tracing_delay_buffer::noop_sink::NoopSink;

#[tokio::main]
async fn main() {
    let sink = Arc::new(NoopSink::default());
    let handler = init_tracing(sink).expect("install tracing");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        info!(iteration = i, "default load test event");
    }

    let elapsed = start.elapsed();
    println!("default config: buffered {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handler.shutdown().await.expect("shutdown");
    println!("stats: {:?}", handler.stats());
}
