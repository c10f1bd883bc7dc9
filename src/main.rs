use std::sync::Arc;

use clap::Parser;
use shelfmark::config::{Cli, Command, Config, default_config_dir, default_config_path};
use shelfmark::db::Database;
use shelfmark::handler::AppState;
use shelfmark::session::Sessions;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing;
use tracing_subscriber::EnvFilter;

const SESSION_CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // --config puts the database next to the config file; otherwise ~/.shelfmark/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("shelfmark.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    if let Some(Command::IssueToken { email, ttl_hours }) = args.command {
        let ttl = chrono::Duration::hours(ttl_hours.unwrap_or(cfg.app.session_ttl_hours));
        let sessions = Sessions::new(&db);
        let issued = match sessions.find_or_create_user(&email).await {
            Ok(user) => sessions.issue(user.id, ttl).await,
            Err(e) => Err(e),
        };
        match issued {
            Ok(token) => println!("{}", token),
            Err(e) => {
                tracing::error!(error = %e, email = %email, "failed to issue token");
                std::process::exit(1);
            }
        }
        return;
    }

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

    let cleanup_db = db.clone();
    let cleanup_token = cancellation_token.clone();
    let cleanup_done = shutdown_complete_tx.clone();
    tokio::spawn(async move {
        let _done = cleanup_done;
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match Sessions::new(&cleanup_db).purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(purged = n, "removed expired sessions"),
                        Err(e) => tracing::warn!("failed to purge expired sessions: {}", e),
                    }
                }
                _ = cleanup_token.cancelled() => {
                    tracing::info!("session cleanup task shutting down");
                    break;
                }
            }
        }
    });

    let app = shelfmark::router(AppState { db });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("shelfmark.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
            cancellation_token.cancel();
        }
    }

    drop(shutdown_complete_tx);
    shutdown_complete_rx.recv().await;
    tracing::info!("shelfmark.svc going off, graceful shutdown complete");
}
