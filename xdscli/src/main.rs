//! `xdscli`: query an xDS management server from the command line.

use std::pin::pin;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use xdscli::client::{connect, run_discovery};
use xdscli::codec::prost::ProstCodec;
use xdscli::output::WriterEmitter;
use xdscli::transport::tonic::TonicTransportBuilder;
use xdscli::{Error, ErrorKind, Result};

mod cli;

use crate::cli::Cli;

/// Exit status for invalid arguments or configuration.
const EXIT_USAGE: u8 = 128;

/// Exit status for a failed session.
const EXIT_SESSION: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &Error) -> u8 {
    match error.kind() {
        ErrorKind::Usage => EXIT_USAGE,
        ErrorKind::Session => EXIT_SESSION,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    let root = CancellationToken::new();
    let mut signals = pin!(shutdown_signal());
    let builder = TonicTransportBuilder::new();

    let transport = tokio::select! {
        biased;
        _ = &mut signals => {
            tracing::info!("received termination signal while connecting");
            return Ok(());
        }
        transport = connect(&builder, &config.server, &root) => transport?,
    };

    let mut emitter = WriterEmitter::stdout(config.output);
    run_discovery(
        &transport,
        ProstCodec,
        config.client,
        &mut emitter,
        signals,
        root,
    )
    .await
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_codes() {
        let usage = [
            Error::UnknownResourceType("xds".to_string()),
            Error::UnsupportedApiVersion("v2".to_string()),
            Error::InvalidMaxRecvSize,
        ];
        for e in &usage {
            assert_eq!(exit_code(e), 128, "{e:?}");
        }

        let session = [
            Error::StreamClosed,
            Error::DialTimeout(Duration::from_secs(2)),
            Error::Timeout("read"),
            Error::Render("broken pipe".to_string()),
        ];
        for e in &session {
            assert_eq!(exit_code(e), 1, "{e:?}");
        }
    }
}
