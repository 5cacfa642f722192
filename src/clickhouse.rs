use crate::record::LogRecord;
use crate::sink::BatchSink;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::error::Error;
use urlencoding;

/// Configuration for [`ClickHouseSink`].
///
/// The sink talks to ClickHouse over HTTP using the `JSONEachRow` format.
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Base URL without query, e.g. "http://127.0.0.1:8123"
    pub url: String,
    /// Database holding `table`.
    pub database: String,
    /// Target table; its columns must match the serialized rows.
    pub table: String,
    /// Written into every row's `service_name` column, for shared tables.
    pub service_name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// ClickHouse implementation of [`BatchSink`] using the HTTP interface.
///
/// Every batch is written with a single `INSERT`, one JSON row per record.
#[derive(Clone)]
pub struct ClickHouseSink {
    client: Client,
    config: ClickHouseConfig,
}

impl ClickHouseSink {
    /// Construct a new sink instance using the provided configuration.
    ///
    /// **Parameters**
    /// - `config`: [`ClickHouseConfig`] describing target URL, database,
    ///   table and optional authentication settings.
    ///
    /// **Returns**
    /// - A ready-to-use [`ClickHouseSink`] that can be passed into
    ///   [`BufferedDelayHandler::builder`](crate::handler::BufferedDelayHandler::builder)
    ///   or [`init_tracing`](crate::init::init_tracing).
    pub fn new(config: ClickHouseConfig) -> Self {
        let client = Client::new();
        Self { client, config }
    }

    /// Insert URL with database, query and URL-encoded credentials.
    fn endpoint(&self) -> String {
        let mut query = format!(
            "database={}&query=INSERT%20INTO%20{}%20FORMAT%20JSONEachRow",
            self.config.database, self.config.table
        );

        if let Some(user) = &self.config.user {
            query.push_str(&format!("&user={}", urlencoding::encode(user)));
        }
        if let Some(password) = &self.config.password {
            query.push_str(&format!("&password={}", urlencoding::encode(password)));
        }

        format!("{}/?{}", self.config.url, query)
    }

    fn map_record(&self, record: &LogRecord) -> ClickHouseRow {
        ClickHouseRow {
            timestamp: record.timestamp.to_rfc3339(),
            level: record.severity.as_str(),
            target: record.target.clone(),
            module_path: record.module_path.clone(),
            file: record.file.clone(),
            line: record.line.map(|l| l as u64),
            message: record.message.clone(),
            service_name: self.config.service_name.clone(),
            fields: serde_json::to_string(&record.fields).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// Render a batch as a `JSONEachRow` body.
    fn body(&self, batch: &[LogRecord]) -> Result<String, serde_json::Error> {
        let mut body = String::new();
        for record in batch {
            body.push_str(&serde_json::to_string(&self.map_record(record))?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[derive(Serialize)]
struct ClickHouseRow {
    timestamp: String,
    level: &'static str,
    target: String,
    module_path: Option<String>,
    file: Option<String>,
    line: Option<u64>,
    message: Option<String>,
    service_name: Option<String>,
    fields: String,
}

/// Posts the whole batch in one request.
///
/// **Returns**
/// - `Ok(())` if ClickHouse answered with a success status.
/// - `Err(..)` on serialization or network errors, or a non-success
///   status (the response body is included in the message).
#[async_trait]
impl BatchSink for ClickHouseSink {
    async fn deliver(&self, batch: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let body = self.body(batch)?;
        let resp = self.client.post(&self.endpoint()).body(body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("ClickHouse insert failed with status {}: {}", status, text).into())
        }
    }
}
