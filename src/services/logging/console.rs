use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use super::{log_name, LogSink, TransportError, WriteEntriesRequest};
use crate::config::{Config, LogStream};
use crate::kernel::event::LogEntry;

/// Prints the exact request body, one JSON line per entry. Stdout by default.
pub struct ConsoleSink<W = Stdout> {
    project_id: String,
    log_name: String,
    writer: Mutex<W>,
}

impl ConsoleSink<Stdout> {
    pub fn new(config: &Config, stream: LogStream) -> Self {
        Self::with_writer(config, stream, tokio::io::stdout())
    }
}

impl<W> ConsoleSink<W> {
    pub fn with_writer(config: &Config, stream: LogStream, writer: W) -> Self {
        Self {
            project_id: config.project_id.clone(),
            log_name: log_name(&config.project_id, config.stream_name(stream)),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> LogSink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let body = WriteEntriesRequest::new(&self.log_name, &self.project_id, entry);
        let mut line = serde_json::to_vec(&body)?;
        line.push(b'\n');

        // One lock per entry keeps concurrent lines whole.
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::event::Severity;
    use serde_json::{json, Map, Value};

    fn entry(message: &str) -> LogEntry {
        let mut fields = Map::new();
        fields.insert("message".into(), json!(message));
        LogEntry {
            message: message.to_string(),
            fields,
            severity: Severity::Info,
        }
    }

    #[tokio::test]
    async fn test_each_entry_is_one_json_line() {
        let sink = ConsoleSink::with_writer(&Config::default(), LogStream::Ci, Vec::new());
        sink.send(&entry("first")).await.unwrap();
        sink.send(&entry("second\nline")).await.unwrap();

        let out = String::from_utf8(sink.into_writer()).unwrap();
        assert!(out.ends_with('\n'));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2, "Embedded newlines must stay escaped: {}", out);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first,
            json!({
                "logName": "projects/clusterfuzz-tools/logs/ci",
                "resource": {"type": "project", "labels": {"project_id": "clusterfuzz-tools"}},
                "entries": [{"jsonPayload": {"message": "first"}, "severity": "INFO"}],
            })
        );
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["entries"][0]["jsonPayload"]["message"], "second\nline");
    }

    #[tokio::test]
    async fn test_stream_selects_log_name() {
        let config = Config {
            project_id: "staging".to_string(),
            ..Config::default()
        };
        let sink = ConsoleSink::with_writer(&config, LogStream::Client, Vec::new());
        sink.send(&entry("x")).await.unwrap();

        let out: Value = serde_json::from_slice(&sink.into_writer()).unwrap();
        assert_eq!(out["logName"], "projects/staging/logs/client");
        assert_eq!(out["resource"]["labels"]["project_id"], "staging");
    }
}
