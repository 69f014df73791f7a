use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{LogSink, TransportError};
use crate::kernel::event::LogEntry;

const MAX_ENTRIES: usize = 10_000;

/// Bounded in-process recorder. Oldest entries are dropped first.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<VecDeque<LogEntry>>,
    attempts: AtomicUsize,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every entry, for exercising transport failures.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Number of `send` calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(TransportError::Rejected("memory sink is failing".to_string()));
        }

        let mut buffer = self.lock();
        if buffer.len() >= MAX_ENTRIES {
            buffer.pop_front();
        }
        buffer.push_back(entry.clone());
        Ok(())
    }
}
