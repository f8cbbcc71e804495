use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

#[derive(Parser, Debug)]
#[command(about = "Server-side header-bidding auction server")]
struct Cli {
    /// Path to the YAML config file; probes ./bidrouter.yaml and
    /// /etc/config/bidrouter.yaml when omitted.
    #[arg(long, env = "BIDROUTER_CONFIG")]
    config_file_path: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Failed to load config file: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to create runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
}

fn main() {
    init_tracing();

    if let Err(e) = cli() {
        tracing::error!(error = %e, "Startup error");
        std::process::exit(1);
    }
}

fn cli() -> Result<(), CliError> {
    let args = Cli::parse();

    let config = match &args.config_file_path {
        Some(path) => Config::from_file(path)?,
        None => Config::discover()?,
    };

    let _sentry_guard = init_sentry(config.logging.clone());
    init_statsd_recorder("bidrouter", config.metrics.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!(error = %e, "Runtime error");
        process::exit(1);
    }
    Ok(())
}

async fn serve(config: Config) -> Result<(), auction::errors::AuctionError> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let signalled = wait_for_shutdown_signal().await;
        tracing::info!(signal = signalled, "Shutting down gracefully");
        let _ = shutdown_tx.send(true);
    });

    let ready = Arc::new(AtomicBool::new(false));
    let admin_host = config.auction.host.clone();
    let admin_port = config.auction.admin_port;
    let admin_ready = ready.clone();
    let admin_shutdown = shutdown_rx.clone();
    let admin = tokio::spawn(async move {
        run_http_service(
            &admin_host,
            admin_port,
            AdminService::<std::io::Error>::new(admin_ready),
            admin_shutdown,
            Duration::from_secs(10),
        )
        .await
    });
    tracing::info!(port = admin_port, "Admin server running");

    let result = auction::run(config.auction, shutdown_rx, ready).await;

    match &result {
        // Normal exit means the shutdown signal fired; the admin server saw
        // the same signal and drains on its own.
        Ok(()) => {
            if let Ok(Err(e)) = admin.await {
                tracing::error!(error = %e, "Admin server error");
            }
        }
        // Startup failure: nothing will ever signal shutdown, so don't wait.
        Err(_) => admin.abort(),
    }
    result
}

async fn wait_for_shutdown_signal() -> &'static str {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = tokio::signal::ctrl_c() => "SIGINT",
    }
}

fn init_statsd_recorder(prefix: &str, metrics_config: Option<MetricsConfig>) {
    if let Some(MetricsConfig {
        statsd_host,
        statsd_port,
    }) = metrics_config
    {
        let recorder = StatsdBuilder::from(statsd_host, statsd_port)
            .build(Some(prefix))
            .expect("Could not create StatsdRecorder");

        metrics::set_global_recorder(recorder).expect("Could not set global metrics recorder")
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(sentry::integrations::tracing::layer())
        .init();
}

fn init_sentry(logging_config: Option<LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    // The Sentry tracing layer (already initialized in main) starts sending
    // events once this client is initialized
    logging_config.map(|cfg| {
        sentry::init((
            cfg.sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    })
}
