//! Main entry point for the erumdata CLI application.

use anyhow::Result;
use clap::Parser;
use indicatif::HumanBytes;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use erumdata::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    // reqwest picks up the process-wide provider; an error only means one is already set
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let summary = erumdata::run(&cli.config()).await?;

    info!(
        "downloaded {}, extracted {} entries",
        HumanBytes(summary.downloaded_bytes),
        summary.extracted_entries
    );

    Ok(())
}

/// Log to stderr. `-qq` limits our own messages to warnings; `RUST_LOG`
/// directives are appended and win over the defaults.
fn setup_logging(cli: &Cli) -> Result<()> {
    let level = if cli.is_very_quiet() {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };

    let directives = format!("{}={level}", env!("CARGO_CRATE_NAME"));
    let directives = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => format!("{directives},{env}"),
        _ => directives,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(directives)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    Ok(())
}
