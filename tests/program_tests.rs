#![cfg(unix)]

use runlog::kernel::context::RunContext;
use runlog::kernel::error::InvocationError;
use runlog::kernel::event::Identity;
use runlog::kernel::invocation::{Invocation, InvocationLogger};
use runlog::kernel::session::SessionId;
use runlog::services::logging::MemorySink;
use runlog::services::program::run_program;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

fn setup(sink: Arc<MemorySink>) -> RunContext {
    let identity = Identity {
        user: "name".to_string(),
        session_id: SessionId::for_user("name", SystemTime::now()),
    };
    RunContext::with_identity(sink, identity)
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn test_interrupted_child_reports_stderr_seen_so_far() {
    let sink = Arc::new(MemorySink::new());
    let context = setup(sink.clone());
    let mut invocation = Invocation::new("reproduce", &()).unwrap();

    let interrupter = context.interrupter();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        interrupter.interrupt();
    });

    let started = Instant::now();
    let err = InvocationLogger::new(&context)
        .run(&mut invocation, |extras| run_program(sh("echo marker >&2; sleep 5"), extras))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4), "Interrupt must not wait for the child");
    assert!(matches!(err, InvocationError::Interrupted));
    assert_eq!(err.exit_code(), Some(1));

    let failure = &sink.entries()[1];
    assert_eq!(failure.fields["exception"], "Interrupted");
    assert_eq!(failure.fields["stderr"], "marker", "Tail must survive the interrupt");
    assert_eq!(failure.fields["program"], "sh");
}

#[tokio::test]
async fn test_known_exit_code_is_an_expected_failure() {
    let sink = Arc::new(MemorySink::new());
    let context = setup(sink.clone());
    let mut invocation = Invocation::new("reproduce", &()).unwrap();

    let err = InvocationLogger::new(&context)
        .run(&mut invocation, |extras| run_program(sh("echo first >&2; echo goma missing >&2; exit 46"), extras))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(46));
    let failure = &sink.entries()[1];
    assert_eq!(failure.fields["exception"], "GomaNotInstalledError");
    assert_eq!(failure.fields["returnCode"], 46);
    assert_eq!(failure.fields["stderr"], "first\ngoma missing");
}

#[tokio::test]
async fn test_unknown_exit_code_is_unclassified_with_tail() {
    let sink = Arc::new(MemorySink::new());
    let context = setup(sink.clone());
    let mut invocation = Invocation::new("reproduce", &()).unwrap();

    let err = InvocationLogger::new(&context)
        .run(&mut invocation, |extras| run_program(sh("echo boom >&2; exit 3"), extras))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), None);
    assert!(err.to_string().contains("boom"), "got {}", err);
    let failure = &sink.entries()[1];
    assert_eq!(failure.fields["exception"], "UnclassifiedError");
    assert_eq!(failure.fields["returnCode"], 3);
}

#[tokio::test]
async fn test_clean_exit_succeeds() {
    let sink = Arc::new(MemorySink::new());
    let context = setup(sink.clone());
    let mut invocation = Invocation::new("reproduce", &()).unwrap();

    InvocationLogger::new(&context)
        .run(&mut invocation, |extras| run_program(sh("exit 0"), extras))
        .await
        .unwrap();

    let success = &sink.entries()[1];
    assert_eq!(success.fields["success"], true);
    assert_eq!(success.fields["returnCode"], 0);
    assert!(success.fields.get("stderr").is_none());
}
