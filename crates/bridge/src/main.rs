use anyhow::Result;
use bridge::{
    config::{BridgeConfig, Cli},
    media::FfmpegMediaService,
    transport::HttpTransport,
    BridgeOrchestrator, FileConfigSource, ShutdownOutcome,
};
use clap::Parser;
use std::{future::Future, process::ExitCode, sync::Arc};
use telemetry::LogConfig;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(ShutdownOutcome::Clean) => ExitCode::SUCCESS,
        Ok(ShutdownOutcome::Forced) => ExitCode::from(2),
        Err(e) => {
            error!(error = %format!("{e:#}"), "bridge exited with error");
            eprintln!("hkcambridge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ShutdownOutcome> {
    let config = BridgeConfig::from_cli(Cli::parse())?;

    let _log_guard = telemetry::init_structured_logging(
        LogConfig::new("hkcambridge")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_verbose(config.verbose),
    )?;

    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        config = %config.config_name,
        "starting camera bridge"
    );

    let orchestrator = BridgeOrchestrator::new(
        config.orchestrator(),
        Arc::new(FileConfigSource::new(config.config_dirs.clone())),
        Arc::new(FfmpegMediaService::new(config.ffmpeg())),
        Arc::new(HttpTransport::new()),
    );

    let shutdown = shutdown_signal();
    let outcome = orchestrator.run(shutdown).await?;
    info!(outcome = ?outcome, "camera bridge stopped");
    Ok(outcome)
}

/// Registers the shutdown signals up front and returns a future that
/// resolves on the first one received. A signal that cannot be registered is
/// logged and never fires.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())
        .inspect_err(|e| error!(error = %e, "cannot listen for SIGINT"))
        .ok();
    let mut terminate = signal(SignalKind::terminate())
        .inspect_err(|e| error!(error = %e, "cannot listen for SIGTERM"))
        .ok();

    async move {
        tokio::select! {
            _ = recv_or_pending(interrupt.as_mut()) => {},
            _ = recv_or_pending(terminate.as_mut()) => {},
        }
        info!("shutdown signal received");
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: Option<&mut tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    }
}
