use crate::format::TextFormatter;
use crate::record::LogRecord;
use crate::sink::BatchSink;
use async_trait::async_trait;
use std::error::Error;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Sink that renders each batch into one block of text and writes it to
/// an [`io::Write`] in a single call.
///
/// Meant for in-process streams (stdout, stderr, files, pipes). An
/// optional header line is written before every batch, the way a mail
/// transport would add a subject.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    formatter: TextFormatter,
    header: Option<String>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            formatter: TextFormatter::default(),
            header: None,
        }
    }

    pub fn with_formatter(mut self, formatter: TextFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    fn render(&self, batch: &[LogRecord]) -> String {
        let body = self.formatter.format_batch(batch);
        match &self.header {
            Some(header) => format!("{}{}{}", header, self.formatter.terminator, body),
            None => body,
        }
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> BatchSink for WriterSink<W> {
    async fn deliver(&self, batch: &[LogRecord]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let text = self.render(batch);
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}
