use tokio::net::TcpListener;
use tracing::info;

use pulse_web::app::{AppState, build_router};
use pulse_web::config::{Config, StoreBackend};
use pulse_web::store::{
    Bootstrap, Candidate, MemoryConnector, RemoteConnector, SqliteConnector, StoreConnector,
};

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async {
            if let Err(err) = run().await {
                eprintln!("{err}");
                std::process::exit(1);
            }
        });
}

async fn run() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let connector: Box<dyn StoreConnector> = match config.backend {
        StoreBackend::Sqlite => Box::new(SqliteConnector::new(config.sqlite_path.clone())),
        StoreBackend::Remote => Box::new(RemoteConnector),
        StoreBackend::Memory => Box::new(MemoryConnector::default()),
    };
    let bootstrap = Bootstrap::new(connector, Candidate::from_config(&config.store));
    let state = AppState::new(bootstrap);

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {}: {e}", config.http_addr))?;
    info!(http_addr = %config.http_addr, backend = ?config.backend, "pulse-web ingest endpoint ready");

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("HTTP server error: {e}"))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
