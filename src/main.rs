use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use clap::Parser;
use likesync::auth::{Credentials, OAuthClient};
use likesync::classify::Classifier;
use likesync::config::{Cli, Config, default_config_dir, default_config_path};
use likesync::db::Database;
use likesync::handler::AppState;
use likesync::routes::routes;
use likesync::sync::SyncOptions;
use likesync::unpack_error;
use likesync::youtube::YouTubeClient;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    // --config puts data (the database) next to the config file, otherwise ~/.likesync/
    let (config_path, data_dir) = match args.config_path.as_deref() {
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

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("likesync.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });

    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.youtube.request_timeout_seconds))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build http client");
            std::process::exit(1);
        });

    let auth = Arc::new(OAuthClient::new(
        http.clone(),
        &cfg.youtube.token_url,
        Credentials::from(&cfg.youtube),
    ));
    let youtube = Arc::new(YouTubeClient::new(
        http,
        auth,
        &cfg.youtube.api_base,
        &cfg.youtube.liked_playlist_id,
        cfg.youtube.page_size,
    ));

    let state = AppState::new(
        db,
        youtube,
        Classifier::new(&cfg.classifier.keywords),
        SyncOptions {
            details_batch_size: cfg.youtube.details_batch_size as usize,
            dedupe: cfg.history.dedupe,
        },
    );

    if args.run_once() {
        run_once(state).await;
    } else {
        serve(state, cfg.app.get_port()).await;
    }
}

/// Scheduled-job entry point: one sync, then exit 0 or 1.
async fn run_once(state: AppState) -> ! {
    match state.run_sync().await {
        Ok(stats) => {
            tracing::info!(inserted = stats.inserted, ?stats, "daily sync completed");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %unpack_error(&e), "daily sync failed");
            std::process::exit(1);
        }
    }
}

async fn serve(state: AppState, port: u16) {
    let address = format!("0.0.0.0:{}", port);
    let cancellation_token = CancellationToken::new();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = routes().layer(cors).with_state(state);

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
        shutdown.cancel();
    });

    tracing::info!("likesync.svc running on {}", &address);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(cancellation_token.cancelled_owned())
        .await;

    if let Err(err) = result {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
    tracing::info!("likesync.svc going off, graceful shutdown complete");
}
