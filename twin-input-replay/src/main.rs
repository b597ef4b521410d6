//! # Twin Input Replay
//!
//! Prints every notification of a replay as one JSON line on stdout.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use twin_input_replay::{run_replay, CliArgs};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,twin_input_core=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // Use JSON format for log shipping (RUST_LOG_FORMAT=json)
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    tracing::info!(
        definitions = %args.definitions.display(),
        script = %args.script.display(),
        "Starting replay"
    );

    let report = run_replay(&args).context("Replay failed")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for notification in &report.notifications {
        let line = serde_json::to_string(notification).context("Failed to encode notification")?;
        writeln!(out, "{line}").context("Failed to write notification")?;
    }

    if !report.rejected.is_empty() {
        tracing::warn!(rejected = report.rejected.len(), "Some steps were rejected");
    }
    Ok(())
}
