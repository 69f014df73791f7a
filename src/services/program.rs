//! Runs an external program as a wrapped command.
//!
//! Child stderr is streamed through to our own stderr as it arrives. Only the
//! last few lines are kept, and they are published into the invocation's extra
//! fields on every line, so even an interrupted run reports what the child
//! printed.

use anyhow::{anyhow, Context};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::kernel::error::{ErrorKind, ExpectedError};
use crate::kernel::invocation::ExtraFields;

/// Lines of child stderr attached to events.
pub const STDERR_TAIL_LINES: usize = 40;

/// Bounded tail of a stream, mirrored into the `stderr` extra field.
#[derive(Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    limit: usize,
    extras: ExtraFields,
}

impl StderrTail {
    pub fn new(limit: usize, extras: ExtraFields) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit,
            extras,
        }
    }

    /// Copies `reader` to `terminal` line by line until EOF, keeping the tail.
    pub async fn follow<R, W>(self, reader: R, mut terminal: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            terminal.write_all(&buf).await?;
            terminal.flush().await?;

            let line = String::from_utf8_lossy(&buf);
            self.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        Ok(())
    }

    pub fn text(&self) -> String {
        let lines = self.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn push(&self, line: String) {
        let text = {
            let mut lines = self.lock();
            lines.push_back(line);
            while lines.len() > self.limit {
                lines.pop_front();
            }
            lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
        };
        self.extras.insert("stderr", text);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs `program[0]` with the remaining arguments.
///
/// Exit 0 is success. An exit code from the error table becomes that
/// [`ExpectedError`]; any other code or a signal is unclassified. The child is
/// killed if this future is dropped.
pub async fn run_program(program: Vec<String>, extras: ExtraFields) -> anyhow::Result<()> {
    let (bin, rest) = program.split_first().ok_or_else(|| anyhow!("No program given"))?;
    extras.insert("program", bin.clone());

    let mut child = tokio::process::Command::new(bin)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", bin))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr of {} was not captured", bin))?;
    let tail = StderrTail::new(STDERR_TAIL_LINES, extras.clone());
    let reader = tokio::spawn(tail.clone().follow(stderr, tokio::io::stderr()));

    let status = child.wait().await?;
    reader.await?.context("Failed to forward child stderr")?;

    let code = status
        .code()
        .ok_or_else(|| anyhow!("{} was terminated by a signal", bin))?;
    extras.insert("returnCode", code);
    if code == 0 {
        return Ok(());
    }

    match ErrorKind::from_exit_code(code) {
        Some(kind) => Err(ExpectedError::new(kind, format!("{} exited with code {}", bin, code)).into()),
        None => Err(anyhow!("{} exited with code {}\n{}", bin, code, tail.text())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tail_keeps_last_lines_and_tees_everything() {
        let extras = ExtraFields::default();
        let tail = StderrTail::new(2, extras.clone());
        let mut terminal = Vec::new();

        tail.clone()
            .follow(&b"a\nb\r\nc\nd"[..], &mut terminal)
            .await
            .unwrap();

        assert_eq!(terminal, b"a\nb\r\nc\nd", "Every byte is forwarded");
        assert_eq!(tail.text(), "c\nd");
        assert_eq!(extras.snapshot()["stderr"], "c\nd");
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_forwarding() {
        let extras = ExtraFields::default();
        let tail = StderrTail::new(5, extras);
        let mut terminal = Vec::new();

        tail.clone()
            .follow(&b"\xff\xfe\nok\n"[..], &mut terminal)
            .await
            .unwrap();

        assert_eq!(terminal.len(), 6);
        assert!(tail.text().ends_with("\nok"));
    }

    #[tokio::test]
    async fn test_empty_program_is_an_error() {
        let err = run_program(Vec::new(), ExtraFields::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "No program given");
    }
}
