//! Connection bootstrapping for the document store.
//!
//! Operators frequently run the store under a slightly different address or
//! credential set than the one configured (compose service names, alternate
//! localhost spellings, default ports). Instead of failing hard, the
//! bootstrapper probes an ordered candidate list, seeded with the configured
//! values and extended with common fallbacks, and caches the first
//! combination that works. A total miss caches nothing so the next call
//! re-probes from scratch and picks up a store that came up late.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::store::{DocumentStore, StoreError};

/// One (user, password, host, port, database) combination to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub db_name: String,
}

impl Candidate {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            host: config.host.clone(),
            port: config.port,
            db_name: config.db_name.clone(),
        }
    }

    /// Loggable description. Never includes the password.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.db_name)
    }
}

/// Opens a store session for one candidate. Implementations decide what
/// "connect" means (TCP dial + hello, opening an embedded file, nothing at
/// all for the in-memory backend).
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, candidate: &Candidate) -> Result<Arc<dyn DocumentStore>, StoreError>;
}

/// Fallback values tried for each field after the configured one. The
/// candidate list is data-driven: adding a fallback is an entry here, not a
/// new code path.
const FALLBACK_USERS: &[&str] = &["admin", "user"];
const FALLBACK_PASSWORDS: &[&str] = &["password", "admin"];
const FALLBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "pulse-store", "store"];
const FALLBACK_PORTS: &[u16] = &[9201, 9202];

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

fn with_fallbacks<T: Clone + PartialEq>(configured: T, fallbacks: &[T]) -> Vec<T> {
    let mut values = vec![configured];
    for value in fallbacks {
        if !values.contains(value) {
            values.push(value.clone());
        }
    }
    values
}

/// Ordered cartesian product over per-field value lists, configured values
/// first so the expected combination is always attempted before any
/// fallback.
pub fn candidate_list(configured: &Candidate) -> Vec<Candidate> {
    let users = with_fallbacks(
        configured.user.clone(),
        &FALLBACK_USERS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    let passwords = with_fallbacks(
        configured.password.clone(),
        &FALLBACK_PASSWORDS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    let hosts = with_fallbacks(
        configured.host.clone(),
        &FALLBACK_HOSTS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    let ports = with_fallbacks(configured.port, FALLBACK_PORTS);

    let mut candidates = Vec::new();
    for user in &users {
        for password in &passwords {
            for host in &hosts {
                for port in &ports {
                    candidates.push(Candidate {
                        user: user.clone(),
                        password: password.clone(),
                        host: host.clone(),
                        port: *port,
                        db_name: configured.db_name.clone(),
                    });
                }
            }
        }
    }
    candidates
}

/// Fields that differ between the configured candidate and the one that
/// actually connected. Password values are never reproduced in logs.
fn drift_fields(configured: &Candidate, working: &Candidate) -> Vec<String> {
    let mut drift = Vec::new();
    if configured.user != working.user {
        drift.push(format!("user: {:?} -> {:?}", configured.user, working.user));
    }
    if configured.password != working.password {
        drift.push(String::from("password: ******** -> ********"));
    }
    if configured.host != working.host {
        drift.push(format!("host: {:?} -> {:?}", configured.host, working.host));
    }
    if configured.port != working.port {
        drift.push(format!("port: {} -> {}", configured.port, working.port));
    }
    if configured.db_name != working.db_name {
        drift.push(format!(
            "dbName: {:?} -> {:?}",
            configured.db_name, working.db_name
        ));
    }
    drift
}

/// Lazily-established, process-wide storage handle.
///
/// The cache lock is held across the whole probe, so concurrent callers
/// never race two probes and a second connection is never opened once one
/// exists.
pub struct Bootstrap {
    connector: Box<dyn StoreConnector>,
    configured: Candidate,
    candidates: Vec<Candidate>,
    attempt_timeout: Duration,
    cached: Mutex<Option<Arc<dyn DocumentStore>>>,
}

impl Bootstrap {
    pub fn new(connector: Box<dyn StoreConnector>, configured: Candidate) -> Self {
        let candidates = candidate_list(&configured);
        Self {
            connector,
            configured,
            candidates,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            cached: Mutex::new(None),
        }
    }

    /// Replace the generated candidate list. Mostly useful in tests.
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Return the shared handle, probing for one first if none is cached.
    /// Safe to call repeatedly and concurrently.
    pub async fn handle(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(store) = cached.as_ref() {
            return Ok(store.clone());
        }

        let (store, working) = self.probe().await?;
        let drift = drift_fields(&self.configured, working);
        if !drift.is_empty() {
            warn!(
                candidate = %working.describe(),
                "configured storage values were wrong and had to be overridden: {}",
                drift.join(", ")
            );
        }
        info!(candidate = %working.describe(), "storage connection established");
        *cached = Some(store.clone());
        Ok(store)
    }

    /// Drop the cached handle. The next `handle` call re-probes.
    pub async fn teardown(&self) {
        let mut cached = self.cached.lock().await;
        if cached.take().is_some() {
            info!("storage handle released");
        }
    }

    async fn probe(&self) -> Result<(Arc<dyn DocumentStore>, &Candidate), StoreError> {
        let mut failures = Vec::new();
        for candidate in &self.candidates {
            debug!(candidate = %candidate.describe(), "probing storage candidate");
            match timeout(self.attempt_timeout, self.connector.connect(candidate)).await {
                Ok(Ok(store)) => return Ok((store, candidate)),
                Ok(Err(e)) => {
                    debug!(candidate = %candidate.describe(), %e, "storage candidate refused");
                    failures.push(format!("{}: {e}", candidate.describe()));
                }
                Err(_) => {
                    debug!(candidate = %candidate.describe(), "storage candidate timed out");
                    failures.push(format!(
                        "{}: timed out after {:?}",
                        candidate.describe(),
                        self.attempt_timeout
                    ));
                }
            }
        }
        Err(StoreError::AllCandidatesFailed {
            summary: failures.join("\n"),
        })
    }
}
