//! Log sinks: where rendered events go.
//!
//! The kernel only ever calls [`LogSink::send`]. One entry per call, no
//! batching, no retry.

pub mod client;
pub mod console;
pub mod credentials;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::kernel::event::{LogEntry, Severity};
use credentials::CredentialsError;

pub use client::StackdriverSink;
pub use console::ConsoleSink;
pub use memory::MemorySink;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to obtain access token: {0}")]
    Auth(#[from] CredentialsError),
    #[error("Log request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Logging endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to write log entry: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink rejected entry: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Durably records one entry.
    async fn send(&self, entry: &LogEntry) -> Result<(), TransportError>;
}

/// Full log name for a stream: `projects/{project}/logs/{stream}`.
pub fn log_name(project_id: &str, stream: &str) -> String {
    format!("projects/{}/logs/{}", project_id, stream)
}

/// Body of an `entries:write` call carrying exactly one entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteEntriesRequest<'a> {
    log_name: &'a str,
    resource: MonitoredResource<'a>,
    entries: [WireEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
struct MonitoredResource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    labels: ResourceLabels<'a>,
}

#[derive(Debug, Serialize)]
struct ResourceLabels<'a> {
    project_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    json_payload: &'a Map<String, Value>,
    severity: Severity,
}

impl<'a> WriteEntriesRequest<'a> {
    pub fn new(log_name: &'a str, project_id: &'a str, entry: &'a LogEntry) -> Self {
        Self {
            log_name,
            resource: MonitoredResource {
                kind: "project",
                labels: ResourceLabels { project_id },
            },
            entries: [WireEntry {
                json_payload: &entry.fields,
                severity: entry.severity,
            }],
        }
    }
}
