//! Per-viewer WebSocket session: one task per socket driving an explicit
//! `Connecting -> Open -> Closed` lifecycle. `Open` is entered once the
//! upgraded socket is registered with the hub (which queues the one-shot
//! snapshot); `Closed` is terminal and always unregisters, whether the
//! remote closed, errored, or the hub dropped the viewer mid-broadcast.

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::app::ids::ViewerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Open,
    Closed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Connecting, Phase::Open)
                | (Phase::Connecting, Phase::Closed)
                | (Phase::Open, Phase::Closed)
        )
    }
}

fn advance(phase: &mut Phase, next: Phase, viewer_id: ViewerId) {
    debug_assert!(
        phase.can_advance_to(next),
        "illegal viewer transition {phase:?} -> {next:?}"
    );
    debug!(%viewer_id, from = ?phase, to = ?next, "viewer session transition");
    *phase = next;
}

/// Runs until the connection closes, then unregisters exactly once.
pub async fn run_viewer(state: AppState, mut socket: WebSocket) {
    let mut phase = Phase::Connecting;
    let (viewer_id, mut outbound) = state.hub.register();
    advance(&mut phase, Phase::Open, viewer_id);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(json) => {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        warn!(%viewer_id, "send to viewer failed");
                        break;
                    }
                }
                // The hub dropped us after a failed delivery.
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(message)) => {
                    debug!(%viewer_id, ?message, "ignoring message from viewer");
                }
                Some(Err(e)) => {
                    warn!(%viewer_id, %e, "viewer socket error");
                    break;
                }
            },
        }
    }

    advance(&mut phase, Phase::Closed, viewer_id);
    state.hub.unregister(viewer_id);
}
