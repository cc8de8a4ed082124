//! Realtime change feed over the platform's Phoenix-channel websocket.
//!
//! ARCHITECTURE
//! ============
//! `subscribe` connects, joins `realtime:bookmarks-{owner}` with a
//! `postgres_changes` filter on `user_id`, waits for the join reply, then
//! hands the socket to a pump task. The pump forwards decoded changes into
//! the subscription channel and sends heartbeats.
//!
//! LIFECYCLE
//! =========
//! 1. Join succeeds → `subscribe` returns.
//! 2. Transport loss → reconnect with exponential back-off, rejoin, emit
//!    `ChangeEvent::Resync` so the consumer reloads what it may have missed.
//! 3. Rejoin refused (the access token expired) → emit `ChangeEvent::Revoked`
//!    and exit. Retrying with the same token cannot succeed.
//! 4. Subscription dropped or closed → pump closes the socket and exits.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::SupabaseClient;
use super::types::{ChangeEvent, ChangeFeed, RealtimeError, Subscription};
use crate::bookmark::{Bookmark, BookmarkId};

const EVENT_QUEUE_CAPACITY: usize = 256;
const JOIN_REF: &str = "1";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// =============================================================================
// EVENT SHAPE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Delete,
    #[serde(other)]
    Other,
}

/// Primary key of a deleted row. Extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: BookmarkId,
}

/// A row change: `{ eventType, new, old }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimePayload {
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(default)]
    pub new: Option<Bookmark>,
    #[serde(default)]
    pub old: Option<RecordKey>,
}

impl RealtimePayload {
    /// Normalize to a change event. Updates and malformed rows yield `None`.
    #[must_use]
    pub fn into_change(self) -> Option<ChangeEvent> {
        match self.event_type {
            EventType::Insert => self.new.map(ChangeEvent::Insert),
            EventType::Delete => self.old.map(|old| ChangeEvent::Delete(old.id)),
            EventType::Other => None,
        }
    }
}

/// `postgres_changes` data as the socket delivers it.
#[derive(Deserialize)]
struct WireChange {
    #[serde(rename = "type")]
    kind: EventType,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    old_record: Option<serde_json::Value>,
}

impl TryFrom<WireChange> for RealtimePayload {
    type Error = serde_json::Error;

    fn try_from(wire: WireChange) -> Result<Self, Self::Error> {
        let new = match (wire.kind, wire.record) {
            (EventType::Insert, Some(record)) => Some(serde_json::from_value(record)?),
            _ => None,
        };
        let old = match (wire.kind, wire.old_record) {
            (EventType::Delete, Some(old)) => Some(serde_json::from_value(old)?),
            _ => None,
        };
        Ok(Self { event_type: wire.kind, new, old })
    }
}

// =============================================================================
// PROTOCOL MESSAGES
// =============================================================================

#[derive(Serialize)]
struct Outbound<'a> {
    topic: &'a str,
    event: &'a str,
    payload: serde_json::Value,
    #[serde(rename = "ref")]
    msg_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    join_ref: Option<&'a str>,
}

#[derive(Deserialize)]
struct Inbound {
    topic: String,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    msg_ref: Option<String>,
}

/// What one inbound socket message means for the subscription.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded {
    Change(ChangeEvent),
    JoinOk,
    JoinError(String),
    ChannelClosed,
    Ignore,
}

pub(crate) fn topic_for(owner: &str) -> String {
    format!("realtime:bookmarks-{owner}")
}

pub(crate) fn join_message(topic: &str, owner: &str, access_token: &str) -> String {
    let payload = serde_json::json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "*",
                "schema": "public",
                "table": "bookmarks",
                "filter": format!("user_id=eq.{owner}"),
            }],
            "private": false,
        },
        "access_token": access_token,
    });
    encode(&Outbound { topic, event: "phx_join", payload, msg_ref: JOIN_REF.into(), join_ref: Some(JOIN_REF) })
}

pub(crate) fn heartbeat_message(msg_ref: u64) -> String {
    encode(&Outbound {
        topic: "phoenix",
        event: "heartbeat",
        payload: serde_json::json!({}),
        msg_ref: msg_ref.to_string(),
        join_ref: None,
    })
}

fn encode(message: &Outbound<'_>) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

pub(crate) fn decode_message(text: &str, topic: &str) -> Decoded {
    let Ok(msg) = serde_json::from_str::<Inbound>(text) else {
        return Decoded::Ignore;
    };
    if msg.topic != topic {
        return Decoded::Ignore;
    }
    match msg.event.as_str() {
        "phx_reply" if msg.msg_ref.as_deref() == Some(JOIN_REF) => {
            let status = msg.payload.get("status").and_then(serde_json::Value::as_str);
            if status == Some("ok") {
                Decoded::JoinOk
            } else {
                let reason = msg
                    .payload
                    .pointer("/response/reason")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("join refused");
                Decoded::JoinError(reason.to_string())
            }
        }
        "postgres_changes" => {
            // Newer servers nest the change under `data`.
            let data = msg.payload.get("data").cloned().unwrap_or(msg.payload);
            serde_json::from_value::<WireChange>(data)
                .ok()
                .and_then(|wire| RealtimePayload::try_from(wire).ok())
                .and_then(RealtimePayload::into_change)
                .map_or(Decoded::Ignore, Decoded::Change)
        }
        "phx_close" | "phx_error" => Decoded::ChannelClosed,
        "system" => {
            if msg.payload.get("status").and_then(serde_json::Value::as_str) == Some("error") {
                let message = msg
                    .payload
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                warn!(%topic, %message, "realtime: system error");
            }
            Decoded::Ignore
        }
        _ => Decoded::Ignore,
    }
}

// =============================================================================
// FEED
// =============================================================================

pub struct RealtimeFeed {
    client: SupabaseClient,
    access_token: String,
}

impl RealtimeFeed {
    #[must_use]
    pub fn new(client: SupabaseClient, access_token: &str) -> Self {
        Self { client, access_token: access_token.to_string() }
    }
}

/// Everything needed to (re)join one channel.
struct Channel {
    socket_url: String,
    topic: String,
    join: String,
    heartbeat: Duration,
}

pub(crate) fn socket_url(client: &SupabaseClient) -> Result<String, RealtimeError> {
    let mut url = reqwest::Url::parse(&client.endpoint("/realtime/v1/websocket"))
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| RealtimeError::Connect(format!("cannot use scheme {scheme}")))?;
    url.query_pairs_mut()
        .append_pair("apikey", client.anon_key())
        .append_pair("vsn", "1.0.0");
    Ok(url.into())
}

#[async_trait::async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, owner: &str) -> Result<Subscription, RealtimeError> {
        let topic = topic_for(owner);
        let channel = Channel {
            socket_url: socket_url(&self.client)?,
            join: join_message(&topic, owner, &self.access_token),
            topic,
            heartbeat: self.client.heartbeat(),
        };
        let socket = join(&channel).await?;
        info!(topic = %channel.topic, "realtime: joined");

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        tokio::spawn(pump(channel, socket, tx));
        Ok(Subscription::new(rx))
    }
}

async fn join(channel: &Channel) -> Result<Socket, RealtimeError> {
    let (mut socket, _) = tokio_tungstenite::connect_async(channel.socket_url.as_str())
        .await
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;
    socket
        .send(Message::Text(channel.join.clone().into()))
        .await
        .map_err(|e| RealtimeError::Connect(e.to_string()))?;

    let reply = tokio::time::timeout(JOIN_TIMEOUT, async {
        while let Some(msg) = socket.next().await {
            let Ok(Message::Text(text)) = msg else {
                continue;
            };
            match decode_message(text.as_str(), &channel.topic) {
                Decoded::JoinOk => return Ok(()),
                Decoded::JoinError(reason) => return Err(RealtimeError::Join(reason)),
                _ => {}
            }
        }
        Err(RealtimeError::Closed)
    })
    .await
    .map_err(|_| RealtimeError::JoinTimeout)?;

    reply.map(|()| socket)
}

#[derive(Debug, PartialEq, Eq)]
enum RelayEnd {
    ReceiverGone,
    Lost,
}

async fn pump(channel: Channel, mut socket: Socket, tx: mpsc::Sender<ChangeEvent>) {
    loop {
        if relay(&channel, &mut socket, &tx).await == RelayEnd::ReceiverGone {
            let _ = socket.close(None).await;
            debug!(topic = %channel.topic, "realtime: subscription closed");
            return;
        }

        warn!(topic = %channel.topic, "realtime: connection lost, reconnecting");
        let mut backoff = INITIAL_BACKOFF;
        socket = loop {
            tokio::time::sleep(backoff).await;
            if tx.is_closed() {
                return;
            }
            match join(&channel).await {
                Ok(s) => break s,
                Err(RealtimeError::Join(reason)) => {
                    warn!(topic = %channel.topic, %reason, "realtime: rejoin refused");
                    let _ = tx.send(ChangeEvent::Revoked).await;
                    return;
                }
                Err(e) => {
                    warn!(topic = %channel.topic, error = %e, ?backoff, "realtime: rejoin failed");
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        };
        info!(topic = %channel.topic, "realtime: rejoined");
        if tx.send(ChangeEvent::Resync).await.is_err() {
            let _ = socket.close(None).await;
            return;
        }
    }
}

async fn relay(channel: &Channel, socket: &mut Socket, tx: &mpsc::Sender<ChangeEvent>) -> RelayEnd {
    let mut heartbeat = tokio::time::interval(channel.heartbeat);
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            () = tx.closed() => return RelayEnd::ReceiverGone,
            _ = heartbeat.tick() => {
                if socket.send(Message::Text(heartbeat_message(next_ref).into())).await.is_err() {
                    return RelayEnd::Lost;
                }
                next_ref += 1;
            }
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => match decode_message(text.as_str(), &channel.topic) {
                    Decoded::Change(event) => {
                        if tx.send(event).await.is_err() {
                            return RelayEnd::ReceiverGone;
                        }
                    }
                    Decoded::ChannelClosed | Decoded::JoinError(_) => return RelayEnd::Lost,
                    Decoded::JoinOk | Decoded::Ignore => {}
                },
                Some(Ok(Message::Close(_)) | Err(_)) | None => return RelayEnd::Lost,
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
