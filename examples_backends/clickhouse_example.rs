use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use tracing_delay_buffer::clickhouse::{ClickHouseConfig, ClickHouseSink};
use tracing_delay_buffer::env::{env_or, DELAY_BUFFER_CLICKHOUSE_URL_ENV};
use tracing_delay_buffer::init::{init_tracing_with_config, LayerConfig};
use tracing_delay_buffer::HandlerConfig;

#[tokio::main]
async fn main() {
    let config = ClickHouseConfig {
        url: env_or(DELAY_BUFFER_CLICKHOUSE_URL_ENV, "http://127.0.0.1:8123"),
        database: "default".to_string(),
        table: "auth_errors".to_string(),
        service_name: Some("auth".to_string()),
        user: Some("default".to_string()),
        password: None,
    };
    let sink = Arc::new(ClickHouseSink::new(config));

    let layer_config = LayerConfig {
        handler: HandlerConfig::from_env().expect("DELAY_BUFFER_* variables"),
        ..LayerConfig::default()
    };
    let handler = init_tracing_with_config(sink, layer_config).expect("install tracing");

    info!("starting service");

    error!(
        user_id = 42,
        reason = "invalid password",
        "authentication failed"
    );

    sleep(Duration::from_secs(2)).await;
    handler.shutdown().await.expect("shutdown");
}
