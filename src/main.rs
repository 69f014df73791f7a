use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use runlog::config::{Config, ConfigLoader, LogStream};
use runlog::kernel::report::RunReport;
use runlog::kernel::session::SessionId;
use runlog::services::logging::client::http_client;
use runlog::services::logging::credentials::StaticToken;
use runlog::services::logging::{ConsoleSink, LogSink, StackdriverSink};
use runlog::services::program::run_program;
use runlog::{Invocation, InvocationLogger, RunContext};

/// Pre-issued bearer token; skips the service-account exchange when set.
const ACCESS_TOKEN_ENV: &str = "RUNLOG_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "runlog", version, about = "Forward test-run outcomes to Cloud Logging")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Config file (defaults: ./runlog.yaml, ~/.runlog/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print request bodies to stdout instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Print a fresh session identifier
    SessionId,
    /// Run a program, logging its start and outcome
    Exec(ExecArgs),
    /// Report one CI reproduction run
    SendRun(SendRunArgs),
}

/// Serialized field names are the logged parameter names.
#[derive(clap::Args, Serialize)]
struct ExecArgs {
    /// Command name recorded in every event
    #[arg(long)]
    #[serde(skip)]
    name: String,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    testcase_id: Option<u64>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<String>,

    #[arg(long)]
    current: bool,

    #[arg(long)]
    enable_debug: bool,

    /// Program and arguments to run
    #[arg(last = true, required = true)]
    #[serde(skip)]
    program: Vec<String>,
}

#[derive(clap::Args)]
struct SendRunArgs {
    #[arg(long)]
    testcase_id: u64,
    #[arg(long)]
    testcase_type: String,
    #[arg(long)]
    version: String,
    #[arg(long)]
    release: String,
    #[arg(long, allow_negative_numbers = true)]
    return_code: i32,
    /// File holding the run's logs
    #[arg(long)]
    logs_file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    opts: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries --dry-run bodies.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ConfigLoader::from_env().load(args.config.as_deref()).await?;

    match args.mode {
        Mode::SessionId => {
            println!("{}", SessionId::generate());
            Ok(())
        }
        Mode::SendRun(run) => {
            let sink = build_sink(&config, LogStream::Ci, args.dry_run)?;
            let logs = match &run.logs_file {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read logs from {}", path.display()))?,
                None => String::new(),
            };
            let report = RunReport {
                testcase_id: run.testcase_id,
                testcase_type: run.testcase_type,
                version: run.version,
                release: run.release,
                return_code: run.return_code,
                logs,
                opts: run.opts,
            };
            tracing::info!("Sending run report: {}", report.message());
            sink.send(&report.to_entry()).await?;
            Ok(())
        }
        Mode::Exec(exec) => {
            let sink = build_sink(&config, LogStream::Client, args.dry_run)?;
            let context = RunContext::new(sink);
            let _signals = context.interrupt_on_ctrl_c();

            let mut invocation = Invocation::new(exec.name.clone(), &exec)?;
            let program = exec.program.clone();
            let result = InvocationLogger::new(&context)
                .run(&mut invocation, |extras| run_program(program, extras))
                .await;

            match result {
                Ok(()) => Ok(()),
                Err(err) => match err.exit_code() {
                    Some(code) => {
                        tracing::error!("{}", err);
                        std::process::exit(code)
                    }
                    None => Err(err.into()),
                },
            }
        }
    }
}

fn build_sink(config: &Config, stream: LogStream, dry_run: bool) -> anyhow::Result<Arc<dyn LogSink>> {
    if dry_run {
        return Ok(Arc::new(ConsoleSink::new(config, stream)));
    }
    if let Some(token) = std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
        let client = http_client(config.timeout());
        let tokens = Arc::new(StaticToken::new(token));
        return Ok(Arc::new(StackdriverSink::with_token_source(client, config, stream, tokens)));
    }
    let sink = StackdriverSink::from_config(config, stream)
        .context("Failed to load logging credentials")?;
    Ok(Arc::new(sink))
}
