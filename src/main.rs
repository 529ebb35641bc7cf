mod backoff;
mod cli;
mod config;
mod gemini;
mod input;
mod keywords;
mod output;
mod pipeline;
mod scienceon;
mod search;

pub const USER_AGENT: &str = concat!("docquota/", env!("CARGO_PKG_VERSION"));

use clap::Parser;
use cli::Cli;
use config::Settings;
use tracing::debug;
use tracing_subscriber::filter::{Directive, ParseError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let directive = log_directive(std::env::var("LOG_LEVEL").ok().as_deref())?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let mut settings = Settings::from_env();
    cli.overrides.apply(&mut settings);
    debug!(?settings, "effective settings");

    cli::run(cli.command, settings)
        .await
        .inspect_err(|e| tracing::error!("{e}"))
}

/// `LOG_LEVEL` scoped to this crate; unset or unknown levels fall back to info.
/// `RUST_LOG` directives still apply on top.
fn log_directive(level: Option<&str>) -> Result<Directive, ParseError> {
    let level = level.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("info");
    format!("docquota={}", level.to_ascii_lowercase())
        .parse()
        .or_else(|_| "docquota=info".parse())
}
