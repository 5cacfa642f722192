use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use tracing_delay_buffer::{
    init::init_tracing,
    record::LogRecord,
    sink::BatchSink,
    writer_sink::WriterSink,
};

/// Example of integrating a custom transport by implementing the
/// `BatchSink` trait directly. Imagine this posts to a chat webhook: one
/// message per batch instead of one per event.
struct ChatWebhookSink {
    text: WriterSink<std::io::Stdout>,
}

#[async_trait]
impl BatchSink for ChatWebhookSink {
    async fn deliver(&self, batch: &[LogRecord]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Here you would call your webhook client. For the sake of example
        // we print the bundled message.
        println!("[chat] bundle of {} event(s):", batch.len());
        self.text.deliver(batch).await
    }
}

#[tokio::main]
async fn main() {
    let sink: Arc<dyn BatchSink> = Arc::new(ChatWebhookSink {
        text: WriterSink::stdout(),
    });

    let handler = init_tracing(sink).expect("install tracing");

    info!("custom backend example started");
    warn!(disk = "/var", used_pct = 91, "disk almost full");
    // ERROR flushes the three events above as one message
    error!(db = "orders", "connection pool exhausted");

    handler.shutdown().await.expect("shutdown");
}
