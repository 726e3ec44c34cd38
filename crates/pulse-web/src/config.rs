use std::path::PathBuf;

use tracing::warn;

/// Where persisted documents go. `sqlite` is the standalone default;
/// `remote` speaks to an external document-store service through the
/// connection bootstrapper; `memory` keeps nothing across restarts and is
/// meant for development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Remote,
    Memory,
}

/// Credentials and address the operator expects the remote document store
/// to be reachable at. These seed the bootstrapper's candidate list; the
/// combination that actually works may differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub db_name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub store: StoreConfig,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

impl Config {
    pub fn from_env() -> Self {
        let backend = match env_or("PULSE_STORE_BACKEND", "sqlite").as_str() {
            "sqlite" => StoreBackend::Sqlite,
            "remote" => StoreBackend::Remote,
            "memory" => StoreBackend::Memory,
            other => {
                warn!(backend = %other, "unknown PULSE_STORE_BACKEND, falling back to sqlite");
                StoreBackend::Sqlite
            }
        };
        let port = env_or("PULSE_STORE_PORT", "9201").parse().unwrap_or_else(|_| {
            warn!("PULSE_STORE_PORT is not a port number, using 9201");
            9201
        });
        Self {
            http_addr: env_or("PULSE_HTTP", "127.0.0.1:9190"),
            backend,
            sqlite_path: PathBuf::from(env_or("PULSE_DB", "pulse-web.sqlite")),
            store: StoreConfig {
                user: env_or("PULSE_STORE_USER", "admin"),
                password: env_or("PULSE_STORE_PASS", "password"),
                host: env_or("PULSE_STORE_HOST", "localhost"),
                port,
                db_name: env_or("PULSE_STORE_DB", "pulse"),
            },
        }
    }
}
