//! trackeame-server – entry point.
//!
//! Startup order:
//! 1. Parse the command line and configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database, run pending migrations and seed carriers.
//! 4. Build the carrier adapters, notifier, job queue and pipeline.
//! 5. Start the worker pool and the sync scheduler.
//! 6. `serve`: start the HTTP server with graceful shutdown.
//! 7. On SIGINT/SIGTERM, stop claiming jobs and drain in-flight ones.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use trackeame_carriers::{AdapterRegistry, RuleBook};
use trackeame_core::store::{CarrierStore, REFERENCE_CARRIERS};
use trackeame_core::{
    JobQueue, LogNotifier, Notifier, Pipeline, ResendNotifier, Scheduler, SqliteStore, WorkerPool,
};

use crate::config::Config;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "trackeame-server", version, about = "Shipment tracking sync service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// HTTP API plus workers and scheduler (default).
    Serve,
    /// Workers and scheduler only.
    Worker,
    /// Insert or refresh the reference carriers, then exit.
    SeedCarriers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let command = Cli::parse().command.unwrap_or(Command::Serve);
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), ?command, "trackeame-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url).await?;
    info!(database_url = %cfg.database_url, "database ready");
    let seeded = store.seed_carriers(REFERENCE_CARRIERS).await?;
    info!(seeded, "reference carriers ensured");
    if command == Command::SeedCarriers {
        return Ok(());
    }

    // ── 4. Pipeline ────────────────────────────────────────────────────────────
    let rules = RuleBook::load(cfg.rules_dir.as_deref())?;
    let adapters = AdapterRegistry::standard(&cfg.acquisition(), &rules)?;
    let notifier: Arc<dyn Notifier> = match &cfg.resend_api_key {
        Some(key) => Arc::new(ResendNotifier::new(
            key.clone(),
            cfg.mail_from.clone(),
            cfg.frontend_url.clone(),
        )?),
        None => {
            warn!("TRACKEAME_RESEND_API_KEY is not set; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let queue = JobQueue::new(store, cfg.queue());
    let pipeline = Arc::new(Pipeline::new(
        queue.clone(),
        Arc::new(adapters),
        notifier,
        cfg.fetch_timeout,
    ));

    // ── 5. Workers + scheduler ─────────────────────────────────────────────────
    let scheduler = Scheduler::new(queue, &cfg.sync_cron)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = tokio::spawn(WorkerPool::new(Arc::clone(&pipeline), cfg.worker()).run(shutdown_rx.clone()));
    let scheduler = tokio::spawn(scheduler.run(shutdown_rx));
    info!(cron = %cfg.sync_cron, workers = cfg.workers, "background sync running");

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    match command {
        Command::Serve => {
            let state = Arc::new(AppState {
                config: Arc::new(cfg.clone()),
                pipeline,
            });
            let app = routes::build(state);
            let addr: SocketAddr = cfg.bind_address.parse()?;
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "HTTP server listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Worker => shutdown_signal().await,
        Command::SeedCarriers => {}
    }

    // ── 7. Drain ───────────────────────────────────────────────────────────────
    if shutdown_tx.send(true).is_err() {
        warn!("background tasks already stopped");
    }
    if let Err(e) = workers.await {
        warn!(error = %e, "worker pool task failed");
    }
    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task failed");
    }

    info!("trackeame-server stopped");
    Ok(())
}

/// Stdout (pretty or JSON) plus an optional daily-rolling file. The returned
/// guard flushes the file writer on drop.
fn init_tracing(cfg: &Config) -> Option<WorkerGuard> {
    // Warn loudly when the configured filter does not parse.
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: TRACKEAME_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let stdout = if cfg.log_json {
        fmt::layer().json().with_target(true).with_thread_ids(true).boxed()
    } else {
        fmt::layer().with_target(true).with_thread_ids(true).boxed()
    };

    let (file, guard) = match &cfg.log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "trackeame.log"));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .with(file)
        .init();
    guard
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c   => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; draining");
}
