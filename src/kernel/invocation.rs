use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::context::RunContext;
use super::error::{ExpectedError, InvocationError, UsageError};
use super::event::{format_event, Failure, Outcome};

/// Argument name reserved for the extra-fields slot; never logged as a param.
pub const EXTRA_FIELDS_SLOT: &str = "extra_log_params";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// Write-only slot a command fills with fields known only after it ran.
#[derive(Debug, Clone, Default)]
pub struct ExtraFields(Arc<Mutex<Map<String, Value>>>);

impl ExtraFields {
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().insert(key.into(), value.into());
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One call of a named command with its named arguments.
#[derive(Debug)]
pub struct Invocation {
    command: String,
    params: Map<String, Value>,
    state: InvocationState,
}

impl Invocation {
    /// `args` must serialize to a map of named fields. Tuple structs,
    /// sequences and scalars are positional and rejected; `()` means no
    /// arguments.
    pub fn new<A: Serialize + ?Sized>(command: impl Into<String>, args: &A) -> Result<Self, UsageError> {
        let command = command.into();
        let named = match serde_json::to_value(args) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(_) => return Err(UsageError::PositionalArguments(command)),
            Err(e) => {
                return Err(UsageError::Unserializable {
                    command,
                    reason: e.to_string(),
                })
            }
        };

        let mut params = Map::new();
        params.insert("command".into(), Value::from(command.clone()));
        params.extend(
            named
                .into_iter()
                .filter(|(key, _)| key != "command" && key != EXTRA_FIELDS_SLOT),
        );

        Ok(Self {
            command,
            params,
            state: InvocationState::NotStarted,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    fn transition(&mut self, next: InvocationState) {
        debug!(command = %self.command, from = ?self.state, to = ?next, "Invocation transition");
        self.state = next;
    }
}

/// Wraps commands with start / success / failure events.
pub struct InvocationLogger<'a> {
    context: &'a RunContext,
}

impl<'a> InvocationLogger<'a> {
    pub fn new(context: &'a RunContext) -> Self {
        Self { context }
    }

    /// Runs `command` once, emitting exactly one start event before it and
    /// exactly one terminal event after it.
    ///
    /// The result is the command's own value on success. Failures come back
    /// classified; see [`InvocationError::exit_code`].
    pub async fn run<T, F, Fut>(&self, invocation: &mut Invocation, command: F) -> Result<T, InvocationError>
    where
        F: FnOnce(ExtraFields) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if invocation.state != InvocationState::NotStarted {
            return Err(UsageError::AlreadyRun(invocation.command.clone()).into());
        }

        invocation.transition(InvocationState::Running);
        info!(command = %invocation.command, "Invocation started");
        self.emit(invocation, &Outcome::Started, &Map::new(), None).await;

        let extras = ExtraFields::default();
        let cancel = self.context.interrupter().arm();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = command(extras.clone()) => Some(result),
        };
        let extra = extras.snapshot();

        match result {
            Some(Ok(value)) => {
                invocation.transition(InvocationState::Succeeded);
                info!(command = %invocation.command, "Invocation succeeded");
                self.emit(invocation, &Outcome::Succeeded, &extra, None).await;
                Ok(value)
            }
            Some(Err(err)) => {
                invocation.transition(InvocationState::Failed);
                let trace = format!("{:?}", err);
                match err.downcast::<ExpectedError>() {
                    Ok(expected) => {
                        info!(command = %invocation.command, error = expected.kind.name(), "Invocation failed");
                        let outcome = Outcome::Failed(Failure::expected(&expected));
                        self.emit(invocation, &outcome, &extra, Some(&trace)).await;
                        Err(InvocationError::Expected(expected))
                    }
                    Err(err) => {
                        info!(command = %invocation.command, "Invocation failed: {}", err);
                        let outcome = Outcome::Failed(Failure::unclassified(&err));
                        self.emit(invocation, &outcome, &extra, Some(&trace)).await;
                        Err(InvocationError::Unclassified(err))
                    }
                }
            }
            None => {
                invocation.transition(InvocationState::Failed);
                info!(command = %invocation.command, "Invocation interrupted");
                let outcome = Outcome::Failed(Failure::interrupted());
                self.emit(invocation, &outcome, &extra, None).await;
                Err(InvocationError::Interrupted)
            }
        }
    }

    async fn emit(
        &self,
        invocation: &Invocation,
        outcome: &Outcome,
        extra: &Map<String, Value>,
        trace: Option<&str>,
    ) {
        let entry = format_event(self.context.identity(), &invocation.params, outcome, extra, trace);
        self.context.emit(entry).await;
    }
}
