use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::event::{Identity, LogEntry};
use crate::services::logging::LogSink;

/// User-interrupt signal scoped to one invocation at a time.
///
/// Each run arms a fresh token, so an interrupt only ends the invocation in
/// flight when it arrives. Later runs start clean.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    current: Arc<Mutex<CancellationToken>>,
}

impl Interrupter {
    /// Cancels the invocation currently running, if any.
    pub fn interrupt(&self) {
        self.lock().cancel();
    }

    /// Installs a fresh token for the next run and returns it.
    pub(crate) fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = token.clone();
        token
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// State shared by every invocation of one run: who is running, where events
/// go, and the user-interrupt signal.
pub struct RunContext {
    identity: Identity,
    sink: Arc<dyn LogSink>,
    interrupter: Interrupter,
}

impl RunContext {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_identity(sink, Identity::current())
    }

    pub fn with_identity(sink: Arc<dyn LogSink>, identity: Identity) -> Self {
        Self {
            identity,
            sink,
            interrupter: Interrupter::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Interrupt the running invocation on every Ctrl-C.
    pub fn interrupt_on_ctrl_c(&self) -> JoinHandle<()> {
        let interrupter = self.interrupter.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                interrupter.interrupt();
            }
        })
    }

    /// Best-effort delivery: transport errors are reported and dropped.
    pub async fn emit(&self, entry: LogEntry) {
        if let Err(e) = self.sink.send(&entry).await {
            warn!("Failed to send log entry: {}", e);
        }
    }
}
