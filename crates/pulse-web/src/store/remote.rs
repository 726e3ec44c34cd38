//! Client for a remote document-store service, newline-delimited JSON over
//! TCP: one `hello` frame authenticating the session, then one request
//! frame per operation, each answered by an ack frame. The dial plus hello
//! happens inside the connector so the bootstrapper's per-candidate timeout
//! bounds the whole exchange.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::bootstrap::{Candidate, StoreConnector};
use crate::store::{DocumentStore, StoreError};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Frame<'a> {
    Hello {
        user: &'a str,
        password: &'a str,
        db: &'a str,
    },
    Upsert {
        collection: &'a str,
        id: &'a str,
        doc: &'a Value,
    },
    Insert {
        collection: &'a str,
        doc: &'a Value,
    },
    Ping,
}

#[derive(Deserialize)]
struct Ack {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// A transport failure means the session (and likely the store) is gone; a
/// refusal is the store answering no to one request over a live session.
enum SessionError {
    Transport(String),
    Refused(String),
}

impl SessionError {
    fn into_unavailable(self) -> StoreError {
        match self {
            SessionError::Transport(reason) | SessionError::Refused(reason) => {
                StoreError::Unavailable(reason)
            }
        }
    }
}

#[derive(Debug)]
struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn exchange(&mut self, frame: &Frame<'_>) -> Result<(), SessionError> {
        let mut line = serde_json::to_vec(frame)
            .map_err(|e| SessionError::Transport(format!("encode store frame: {e}")))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| SessionError::Transport(format!("store connection lost: {e}")))?;

        let mut reply = String::new();
        let n = self
            .reader
            .read_line(&mut reply)
            .await
            .map_err(|e| SessionError::Transport(format!("store connection lost: {e}")))?;
        if n == 0 {
            return Err(SessionError::Transport(String::from(
                "store closed the connection",
            )));
        }
        let ack: Ack = serde_json::from_str(reply.trim_end())
            .map_err(|e| SessionError::Transport(format!("malformed store reply: {e}")))?;
        if ack.ok {
            Ok(())
        } else {
            Err(SessionError::Refused(
                ack.error.unwrap_or_else(|| String::from("store refused request")),
            ))
        }
    }
}

/// One authenticated session, shared by all handlers. Requests are
/// serialized over the session mutex; the store handle itself is the single
/// shared resource the bootstrapper hands out.
#[derive(Debug)]
pub struct RemoteStore {
    session: Mutex<Session>,
}

impl RemoteStore {
    async fn request(&self, collection: &str, frame: Frame<'_>) -> Result<(), StoreError> {
        let mut session = self.session.lock().await;
        session.exchange(&frame).await.map_err(|e| match e {
            // An explicit nack only costs this write; a dead connection
            // means the backend itself is gone.
            SessionError::Refused(reason) => StoreError::Write {
                collection: collection.into(),
                reason,
            },
            transport => transport.into_unavailable(),
        })
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.request(collection, Frame::Upsert {
            collection,
            id,
            doc: &doc,
        })
        .await
    }

    async fn insert(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.request(collection, Frame::Insert {
            collection,
            doc: &doc,
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut session = self.session.lock().await;
        session
            .exchange(&Frame::Ping)
            .await
            .map_err(SessionError::into_unavailable)
    }
}

/// Dials `host:port` and authenticates with the candidate's credentials.
#[derive(Default)]
pub struct RemoteConnector;

#[async_trait]
impl StoreConnector for RemoteConnector {
    async fn connect(&self, candidate: &Candidate) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let addr = format!("{}:{}", candidate.host, candidate.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| StoreError::Unavailable(format!("dial {addr}: {e}")))?;
        let (read_half, write_half) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        session
            .exchange(&Frame::Hello {
                user: &candidate.user,
                password: &candidate.password,
                db: &candidate.db_name,
            })
            .await
            .map_err(SessionError::into_unavailable)?;
        debug!(%addr, db = %candidate.db_name, "remote store session authenticated");
        Ok(Arc::new(RemoteStore {
            session: Mutex::new(session),
        }))
    }
}
