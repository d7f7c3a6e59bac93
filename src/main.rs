use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nestify::api::{auth, rate_limit};
use nestify::config::Config;
use nestify::{api, db, AppState};

const SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Parser)]
#[command(name = "nestify", version, about = "Real-estate marketplace API server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "nestify.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, env = "NESTIFY_LOG")]
    log_level: Option<String>,

    /// Seed demo users and listings, then exit
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("nestify={},tower_http=info", log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tokio::fs::create_dir_all(&config.server.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", config.server.data_dir.display()))?;
    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.uploads.dir.display()))?;

    let pool = db::init(&config.server.data_dir).await?;
    auth::ensure_admin_user(
        &pool,
        &config.auth.admin_email,
        config.auth.admin_password.as_deref(),
    )
    .await?;

    if cli.seed {
        db::seed_demo_data(&pool).await?;
        tracing::info!("Seeding complete");
        return Ok(());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, pool));

    if state.config.rate_limit.enabled {
        rate_limit::spawn_cleanup_task(
            state.rate_limiter.clone(),
            state.config.rate_limit.cleanup_interval,
        );
    }
    auth::spawn_session_sweeper(state.db.clone(), SESSION_SWEEP_INTERVAL_SECS);

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
