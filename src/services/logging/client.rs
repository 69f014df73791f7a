use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::credentials::{AccessTokenSource, CredentialsError, ServiceAccountKey, ServiceAccountTokenSource};
use super::{log_name, LogSink, TransportError, WriteEntriesRequest};
use crate::config::{Config, LogStream};
use crate::kernel::event::LogEntry;

/// Writes entries to Cloud Logging with one authenticated POST each.
#[derive(Clone)]
pub struct StackdriverSink {
    client: Client,
    endpoint: String,
    project_id: String,
    log_name: String,
    tokens: Arc<dyn AccessTokenSource>,
}

pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

impl StackdriverSink {
    /// Loads the service-account key from `config.credentials_path`.
    /// Fails when the key cannot be read or parsed.
    pub fn from_config(config: &Config, stream: LogStream) -> Result<Self, CredentialsError> {
        let client = http_client(config.timeout());
        let key = ServiceAccountKey::load(&config.credentials_path)?;
        let tokens = ServiceAccountTokenSource::new(key, &config.scope, client.clone())?;
        Ok(Self::with_token_source(client, config, stream, Arc::new(tokens)))
    }

    pub fn with_token_source(
        client: Client,
        config: &Config,
        stream: LogStream,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            project_id: config.project_id.clone(),
            log_name: log_name(&config.project_id, config.stream_name(stream)),
            tokens,
        }
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }
}

#[async_trait]
impl LogSink for StackdriverSink {
    async fn send(&self, entry: &LogEntry) -> Result<(), TransportError> {
        let token = self.tokens.access_token().await?;
        let body = WriteEntriesRequest::new(&self.log_name, &self.project_id, entry);

        debug!(log_name = %self.log_name, severity = ?entry.severity, "Writing log entry");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(())
    }
}
