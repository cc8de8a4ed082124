//! Live websocket: one bookmark view per dashboard connection.
//!
//! DESIGN
//! ======
//! On upgrade the handler spawns a view for the signed-in user, scoped to
//! their access token, and enters a `select!` loop:
//! - Incoming client frames → spawned request task → reply frame queue
//! - Reply frames → forward to client
//! - Snapshot changes → forward as `bookmark:snapshot`
//!
//! Requests run in their own tasks so a slow store call never delays
//! snapshot delivery. Replies correlate by `parent_id`.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (401 before upgrade when not signed in) → spawn view
//! 2. First load lands → `bookmark:snapshot` with `loaded: true`
//! 3. Close → drop the view handle; the view closes its subscription
//! 4. View ends on its own (the platform rejected the access token) → close
//!    with `SESSION_EXPIRED_CLOSE_CODE`; the page reloads through the session
//!    gate, which refreshes the cookies or sends the user to `/login`

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::gate::Authenticated;
use crate::frame::{Data, Frame, Status};
use crate::state::AppState;
use crate::sync::{Snapshot, ViewHandle, spawn_view};

const REPLY_QUEUE_CAPACITY: usize = 64;

/// Application close code: the session behind this socket is no longer valid.
pub const SESSION_EXPIRED_CLOSE_CODE: u16 = 4401;

pub const SYSCALL_SNAPSHOT: &str = "bookmark:snapshot";
pub const SYSCALL_CREATE: &str = "bookmark:create";
pub const SYSCALL_DELETE: &str = "bookmark:delete";

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /api/live`
pub async fn handle_live(State(state): State<AppState>, auth: Authenticated, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_live(socket, state, auth))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_live(mut socket: WebSocket, state: AppState, auth: Authenticated) {
    let owner = auth.identity.id.clone();
    let view = spawn_view(
        owner.clone(),
        state.data.store(&auth.access_token),
        state.data.feed(&auth.access_token),
    );
    let mut snapshots = view.snapshots();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Frame>(REPLY_QUEUE_CAPACITY);

    info!(%owner, "live: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => dispatch(&view, &reply_tx, text.as_str()),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = reply_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Only expiry ends a view while this handle is alive.
                    while let Ok(frame) = reply_rx.try_recv() {
                        let _ = send_frame(&mut socket, &frame).await;
                    }
                    warn!(%owner, "live: session expired; closing socket");
                    let close = CloseFrame { code: SESSION_EXPIRED_CLOSE_CODE, reason: "session expired".into() };
                    let _ = socket.send(Message::Close(Some(close))).await;
                    break;
                }
                let frame = snapshot_frame(&snapshots.borrow_and_update());
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%owner, "live: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse an incoming frame and run it in its own task.
fn dispatch(view: &ViewHandle, replies: &mpsc::Sender<Frame>, text: &str) {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "live: invalid inbound frame");
            return;
        }
    };
    if req.status != Status::Request {
        warn!(syscall = %req.syscall, "live: ignoring non-request frame");
        return;
    }

    let view = view.clone();
    let replies = replies.clone();
    tokio::spawn(async move {
        let reply = handle_request(&view, &req).await;
        let _ = replies.send(reply).await;
    });
}

pub(crate) async fn handle_request(view: &ViewHandle, req: &Frame) -> Frame {
    match req.syscall.as_str() {
        SYSCALL_CREATE => {
            let title = req.str_field("title").unwrap_or_default();
            let url = req.str_field("url").unwrap_or_default();
            match view.create(title, url).await {
                Ok(bookmark) => match serde_json::to_value(&bookmark) {
                    Ok(value) => req.done().with_data("bookmark", value),
                    Err(_) => req.done(),
                },
                Err(e) => req.error_from(&e),
            }
        }
        SYSCALL_DELETE => {
            let Some(id) = req.str_field("id").filter(|id| !id.is_empty()) else {
                return req.error("id required");
            };
            match view.delete(id).await {
                Ok(()) => req.done(),
                Err(e) => req.error_from(&e),
            }
        }
        other => req.error(format!("unknown syscall: {other}")),
    }
}

pub(crate) fn snapshot_frame(snapshot: &Snapshot) -> Frame {
    let data: Data = match serde_json::to_value(snapshot) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    };
    Frame::request(SYSCALL_SNAPSHOT, data)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "live: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.str_field(crate::frame::FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(crate::frame::FRAME_MESSAGE).unwrap_or("-");
        info!(syscall = %frame.syscall, %code, %message, "live: error reply");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "live_test.rs"]
mod tests;
