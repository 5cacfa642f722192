/// Environment variable names used by this crate for convenient
/// configuration of handlers from services.
///
/// These are purely helpers; the handler itself never reads the
/// environment. See [`HandlerConfig::from_env`](crate::config::HandlerConfig::from_env).

/// Maximum number of buffered records before a flush.
pub const DELAY_BUFFER_CAPACITY_ENV: &str = "DELAY_BUFFER_CAPACITY";

/// Delay in milliseconds between the first buffered record and the
/// automatic flush. `none` or an empty value disables the delay.
pub const DELAY_BUFFER_DELAY_MS_ENV: &str = "DELAY_BUFFER_DELAY_MS";

/// Severity name at or above which a record flushes the buffer immediately.
pub const DELAY_BUFFER_FLUSH_LEVEL_ENV: &str = "DELAY_BUFFER_FLUSH_LEVEL";

/// `true`/`false`: flush residual records on shutdown.
pub const DELAY_BUFFER_FLUSH_ON_CLOSE_ENV: &str = "DELAY_BUFFER_FLUSH_ON_CLOSE";

/// ClickHouse base HTTP URL, e.g. `http://127.0.0.1:8123`.
pub const DELAY_BUFFER_CLICKHOUSE_URL_ENV: &str = "DELAY_BUFFER_CLICKHOUSE_URL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
