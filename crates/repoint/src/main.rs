//! repoint command-line interface
//!
//! Reads a cluster failover notification and repoints the idle custom
//! endpoint at the promoted reader.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use repoint::cli::{init_logging, render_config, ConfigArgs, LogArgs};
use repoint::{handle_notification_with_cancel, RdsControlPlane};
use repoint_core::{decode, ReconciliationDriver};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Repoint an Aurora custom endpoint after a cluster failover
#[derive(Parser, Debug)]
#[command(name = "repoint")]
#[command(about = "Repoints an Aurora custom endpoint at the promoted instance after failover")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the endpoint for one failover notification
    Reconcile {
        /// Notification file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },
    /// Decode a notification and print it without contacting AWS
    Decode {
        /// Notification file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config.to_config()?;

    if cli.print_config {
        println!("{}", render_config(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        bail!("no command given");
    };

    init_logging(&cli.log)?;

    match command {
        Command::Decode { event } => {
            let raw = read_event(&event).await?;
            let decoded = decode(&raw).context("Failed to decode notification")?;
            println!("{}", serde_json::to_string_pretty(&decoded)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Reconcile { event } => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                region = %config.region,
                policy = ?config.failure_policy,
                "Starting repoint"
            );

            let raw = read_event(&event).await?;
            let control_plane = Arc::new(
                RdsControlPlane::from_config(&config)
                    .await
                    .context("Failed to create RDS client")?,
            );
            let driver = ReconciliationDriver::new(config, control_plane.clone(), control_plane)
                .context("Failed to create reconciliation driver")?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling reconciliation");
                    on_interrupt.cancel();
                }
            });

            let invocation = handle_notification_with_cancel(&driver, &raw, cancel).await;
            interrupt.abort();
            println!("{}", serde_json::to_string_pretty(&invocation.response())?);

            Ok(ExitCode::from(
                u8::try_from(invocation.exit_code()).unwrap_or(u8::MAX),
            ))
        }
    }
}

async fn read_event(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut raw = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut raw)
            .await
            .context("Failed to read notification from stdin")?;
        return Ok(raw);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read notification from {}", path.display()))
}
