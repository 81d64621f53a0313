mod adapters;
mod aggregator;
mod app;
mod cache;
mod cli;
mod clusterer;
mod config;
mod controller;
mod error;
mod facade;
mod history;
mod http;
mod model;
mod persistence;
mod routes;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::{App, AdapterToggles};
use crate::cli::Cli;
use crate::config::{Config, LogFormat};

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format, cli.verbose);

    let code = if cli.daemon {
        run_server(config, cli.toggles(), Duration::from_secs(cli.interval)).await
    } else {
        cli::run_one_shot(&cli, config).await
    };
    std::process::exit(code);
}

/// Runs the long-lived HTTP service: boots the adapter set, performs an
/// initial synchronous refresh (or reuses a fresh persisted snapshot), then
/// serves requests while the background refresh loop keeps the snapshot
/// current until a shutdown signal arrives.
async fn run_server(config: Config, toggles: AdapterToggles, refresh_interval: Duration) -> i32 {
    let mut config = config;
    config.refresh_interval = refresh_interval;

    let application = App::bootstrap(config, toggles).await;
    let controller = application.facade.controller().clone();
    controller.bootstrap(application.config.stale_threshold).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let background = {
        let controller = controller.clone();
        let interval = application.config.refresh_interval;
        tokio::spawn(Box::pin(async move { controller.run(interval, shutdown_rx).await }))
    };

    let bind_addr: SocketAddr = match application.config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(%err, addr = %application.config.bind_addr, "invalid bind address");
            return 1;
        }
    };

    let router = routes::router()
        .with_state(application.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %bind_addr, "failed to bind");
            return 1;
        }
    };
    tracing::info!(%bind_addr, "trendwatch listening");

    let shutdown_grace = application.config.shutdown_grace;
    if let Err(err) = axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown_signal()).await {
        tracing::error!(%err, "server exited with error");
    }

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(shutdown_grace, background).await;
    0
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
