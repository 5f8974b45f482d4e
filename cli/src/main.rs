use std::{io, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use numbers::server::{FileSink, Server, ServerConfig, StoreKind};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How numbers are deduplicated.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Store {
    /// Hash set behind one lock; memory grows with distinct numbers
    Map,
    /// Preallocated bitmap behind one lock
    Dense,
    /// Preallocated bitmap of atomic words, no shared lock
    Atomic,
}

impl From<Store> for StoreKind {
    fn from(store: Store) -> Self {
        match store {
            Store::Map => StoreKind::Map,
            Store::Dense => StoreKind::Dense,
            Store::Atomic => StoreKind::Atomic,
        }
    }
}

/// Collects 9-digit numbers from many clients and logs each one the first
/// time it is seen.
#[derive(Parser, Debug)]
#[command(name = "numbers-server", version, about, long_about = None)]
struct Args {
    #[arg(long, env = "NUMBERS_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "NUMBERS_PORT", default_value_t = 4000)]
    port: u16,

    /// Clients served at once; others wait their turn.
    #[arg(short = 'c', long, env = "NUMBERS_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: usize,

    /// Seconds between stats reports.
    #[arg(long, env = "NUMBERS_REPORT_INTERVAL", default_value_t = 10)]
    report_interval_secs: u64,

    /// File the unique numbers are written to. Replaced on startup.
    #[arg(short, long, env = "NUMBERS_OUTPUT", default_value = "numbers.log")]
    output: PathBuf,

    #[arg(long, env = "NUMBERS_STORE", value_enum, default_value = "atomic")]
    store: Store,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    run(Args::parse()).await
}

async fn run(args: Args) -> ExitCode {
    let config = ServerConfig::builder()
        .host(args.host)
        .port(args.port)
        .max_connections(args.max_connections)
        .report_interval(Duration::from_secs(args.report_interval_secs))
        .store(args.store.into())
        .build();

    // bind before touching the output so a failed start keeps the last run's file
    let listener = match Server::bind(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    let sink = match FileSink::create(&args.output) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    let server = Server::with_listener(listener, config, sink);

    let token = server.cancellation_token();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                info!("shutdown requested");
                token.cancel();
            }
            Err(e) => warn!("failed to listen for shutdown signals: {}", e),
        }
    });

    let result = server.process().await;
    if let Err(e) = server.stop() {
        warn!("{}", e);
    }
    match result {
        Ok(()) => {
            println!("{}", server.recorder().report());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => interrupted,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
