mod client;
mod config;
mod error;
mod memory;
mod poll_loop;
mod poller;
mod select_stream_or_shutdown;
mod ticker;
mod types;

use crate::types::GenericBoxedStream;
use clap::Parser;
use config::{PollerConfig, DEFAULT_PORT};
use poll_loop::run_until_shutdown;
use poller::Poller;
use select_stream_or_shutdown::request_shutdown;
use std::sync::Arc;
use ticker::tick_stream;
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Inference servers to watch, as host or host:port
    #[arg(long, value_delimiter = ',', default_value = "localhost")]
    servers: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_PORT, help = "Port used for servers given without one")]
    port: u16,
    /// Poll interval in seconds
    #[arg(long, default_value = "1", help = "Poll interval, in seconds")]
    interval: u64,
    #[arg(long, default_value = "10", help = "Per-request timeout, in seconds")]
    request_timeout: u64,
    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,
    /// Log which model would be unloaded without unloading it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match PollerConfig::new(
        &args.servers,
        args.port,
        args.interval,
        args.request_timeout,
        args.dry_run,
    ) {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let build = option_env!("GIT_COMMIT_HASH").unwrap_or("unknown");
    info!(
        "modelreaper {} ({}) watching {} every {:?}{}",
        env!("CARGO_PKG_VERSION"),
        build,
        config
            .servers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        config.interval,
        if config.dry_run { " (dry run)" } else { "" }
    );

    let poller = Poller::new(config);

    if args.once {
        poller.poll_once(1).await.log();
        return Ok(());
    }

    let shutdown_notify = Arc::new(Notify::new());
    tokio::spawn({
        let interrupt_handle = shutdown_notify.clone();
        async move {
            wait_for_signal().await;
            request_shutdown(&interrupt_handle);
        }
    });

    let ticks: GenericBoxedStream<u64> = Box::pin(tick_stream(poller.config().interval));
    let iterations = run_until_shutdown(ticks, shutdown_notify, |iteration| {
        let poller = &poller;
        async move {
            poller.poll_once(iteration).await.log();
        }
    })
    .await;

    info!("Stopped after {} iterations", iterations);
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
