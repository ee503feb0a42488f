use clap::Parser;
use sea_orm::{ConnectOptions, Database};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sitepulse::db::run_migrations;
use sitepulse::scheduler::clock::SystemClock;
use sitepulse::server::config::MonitorConfig;
use sitepulse::server::{MonitorRuntime, Repositories};
use sitepulse::web::{AppState, create_router};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Keep everything in memory instead of connecting to PostgreSQL
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "sitepulse.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // --- Config ---
    let config = match MonitorConfig::load(args.config.as_deref(), args.dry_run) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), dry_run = args.dry_run, "Starting sitepulse.");

    // --- Storage ---
    let repos = match (&config.database_url, args.dry_run) {
        (Some(database_url), false) => {
            let mut opt = ConnectOptions::new(database_url.to_owned());
            opt.max_connections(10).sqlx_logging(false);
            let db = Database::connect(opt).await.map_err(|e| {
                error!(error = %e, "Failed to connect to the database.");
                e
            })?;
            run_migrations(&db).await?;
            Repositories::postgres(db)
        }
        _ => {
            warn!("Running with in-memory storage; nothing will be persisted.");
            Repositories::in_memory()
        }
    };

    // --- Services ---
    let runtime = MonitorRuntime::build(&config, repos, Arc::new(SystemClock))?;
    if !config.sites.is_empty() {
        let added = runtime.seed_sites(config.sites.clone()).await?;
        info!(added, configured = config.sites.len(), "Configured sites registered.");
    }

    // --- Recurring sweeps ---
    let scheduler = Arc::new(runtime.scheduler(&config).start(config.shutdown_grace()));

    // --- Admin HTTP ---
    let app_state = Arc::new(AppState {
        monitor: runtime.monitor.clone(),
        scheduler: Some(scheduler.clone()),
    });
    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Admin API listening.");

    let serve_result = axum::serve(listener, create_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.shutdown().await;
    serve_result?;
    info!("sitepulse stopped.");
    Ok(())
}
