//! View actor: one live bookmark list per open dashboard.
//!
//! ARCHITECTURE
//! ============
//! `spawn_view` starts a task that owns a `Synchronizer` and is its only
//! writer. Three inputs feed it through `select!`:
//!
//! - commands from `ViewHandle` (create, delete),
//! - results of store calls, which run in spawned tasks so a slow request
//!   never blocks realtime delivery,
//! - realtime change events from the owner's subscription.
//!
//! After each input the actor publishes a `Snapshot` on a watch channel if
//! anything observable changed.
//!
//! LIFECYCLE
//! =========
//! 1. Subscribe to the change feed (failure is logged and the view runs
//!    without live updates).
//! 2. Load the owner's rows. Commands arriving before the first load lands
//!    are deferred, not rejected.
//! 3. Serve until every `ViewHandle` is dropped, then close the
//!    subscription and the synchronizer. Store results that arrive later
//!    are discarded.
//! 4. If the platform rejects the access token (store 401 or a revoked
//!    feed), every waiting caller gets `ViewError::Unauthorized` and the view
//!    ends early. The snapshot channel closes, which is how holders notice.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{Synchronizer, Ticket};
use crate::bookmark::{Bookmark, BookmarkId, NewBookmark, OwnerId, ValidationError};
use crate::frame::ErrorCode;
use crate::supabase::{BookmarkStore, ChangeEvent, ChangeFeed, StoreError, Subscription};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

/// What a view renders. `loaded` is false until the first load settles;
/// `error` carries the last load failure, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub revision: u64,
    pub bookmarks: Vec<Bookmark>,
    pub loaded: bool,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Store(StoreError),
    #[error("session expired")]
    Unauthorized,
    #[error("bookmark view closed")]
    Closed,
}

impl From<StoreError> for ViewError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized(_) => Self::Unauthorized,
            other => Self::Store(other),
        }
    }
}

impl ErrorCode for ViewError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Closed => "E_VIEW_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            Self::Validation(_) | Self::Unauthorized | Self::Closed => false,
        }
    }
}

enum Command {
    Create { candidate: NewBookmark, reply: oneshot::Sender<Result<Bookmark, ViewError>> },
    Delete { id: BookmarkId, reply: oneshot::Sender<Result<(), ViewError>> },
}

enum Event {
    Loaded(Result<Vec<Bookmark>, StoreError>),
    Inserted(Ticket, Result<Bookmark, StoreError>),
    Deleted(Ticket, Result<(), StoreError>),
}

enum Reply {
    Create(oneshot::Sender<Result<Bookmark, ViewError>>),
    Delete(oneshot::Sender<Result<(), ViewError>>),
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front door to a running view. The view shuts down when the
/// last handle is dropped.
#[derive(Clone)]
pub struct ViewHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ViewHandle {
    /// Validate and persist a new bookmark. Resolves with the stored row once
    /// it is in the list.
    ///
    /// # Errors
    ///
    /// `Validation` before anything is sent, `Store` if the insert failed,
    /// `Closed` if the view shut down first.
    pub async fn create(&self, title: &str, url: &str) -> Result<Bookmark, ViewError> {
        let candidate = NewBookmark::parse(title, url)?;
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Create { candidate, reply }).await.map_err(|_| ViewError::Closed)?;
        rx.await.map_err(|_| ViewError::Closed)?
    }

    /// Delete a bookmark. The entry leaves the list at once and comes back
    /// if the store refuses. Deleting an id that is not listed succeeds.
    ///
    /// # Errors
    ///
    /// `Store` if the delete failed, `Closed` if the view shut down first.
    pub async fn delete(&self, id: &str) -> Result<(), ViewError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Delete { id: id.to_string(), reply })
            .await
            .map_err(|_| ViewError::Closed)?;
        rx.await.map_err(|_| ViewError::Closed)?
    }

    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

// =============================================================================
// SPAWN
// =============================================================================

/// Start a view for `owner`. Must be called inside a tokio runtime.
pub fn spawn_view(owner: OwnerId, store: Arc<dyn BookmarkStore>, feed: Arc<dyn ChangeFeed>) -> ViewHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot::default());

    let actor = ViewActor {
        owner,
        store,
        sync: Synchronizer::new(),
        snapshots: snapshots_tx,
        events: events_tx,
        replies: HashMap::new(),
        deferred: VecDeque::new(),
        error: None,
        loading: false,
        reload_queued: false,
        expired: false,
    };

    tokio::spawn(async move {
        let subscription = match feed.subscribe(&actor.owner).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(owner = %actor.owner, error = %e, "view: realtime subscribe failed; running without live updates");
                None
            }
        };
        actor.run(commands_rx, events_rx, subscription).await;
    });

    ViewHandle { commands: commands_tx, snapshots: snapshots_rx }
}

// =============================================================================
// ACTOR
// =============================================================================

struct ViewActor {
    owner: OwnerId,
    store: Arc<dyn BookmarkStore>,
    sync: Synchronizer,
    snapshots: watch::Sender<Snapshot>,
    events: mpsc::Sender<Event>,
    replies: HashMap<Ticket, Reply>,
    deferred: VecDeque<Command>,
    error: Option<String>,
    loading: bool,
    reload_queued: bool,
    expired: bool,
}

impl ViewActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<Event>,
        mut subscription: Option<Subscription>,
    ) {
        info!(owner = %self.owner, "view: started");
        self.load();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.on_command(command);
                }
                Some(event) = events.recv() => self.on_event(event),
                change = next_change(&mut subscription) => match change {
                    Some(change) => self.on_change(change),
                    None => {
                        warn!(owner = %self.owner, "view: realtime feed ended");
                        subscription = None;
                    }
                },
            }
            if self.expired {
                break;
            }
            self.publish();
        }

        if let Some(subscription) = subscription {
            subscription.close();
        }
        info!(owner = %self.owner, phase = ?self.sync.phase(), "view: closing");
        self.sync.close();
    }

    fn on_command(&mut self, command: Command) {
        if !self.sync.is_seeded() {
            self.deferred.push_back(command);
            return;
        }
        match command {
            Command::Create { candidate, reply } => {
                let ticket = self.sync.begin_insert();
                self.replies.insert(ticket, Reply::Create(reply));
                let store = self.store.clone();
                let owner = self.owner.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = store.insert(&owner, &candidate).await;
                    let _ = events.send(Event::Inserted(ticket, result)).await;
                });
            }
            Command::Delete { id, reply } => {
                let Some(ticket) = self.sync.begin_delete(&id) else {
                    debug!(owner = %self.owner, %id, "view: delete of unlisted id");
                    let _ = reply.send(Ok(()));
                    return;
                };
                self.replies.insert(ticket, Reply::Delete(reply));
                let store = self.store.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = store.delete_by_id(&id).await;
                    let _ = events.send(Event::Deleted(ticket, result)).await;
                });
            }
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Loaded(result) => self.on_loaded(result),
            Event::Inserted(ticket, result) => {
                let reply = match result {
                    Ok(bookmark) => {
                        self.sync.confirm_insert(ticket, bookmark.clone());
                        Ok(bookmark)
                    }
                    Err(e) => {
                        warn!(owner = %self.owner, error = %e, "view: insert failed");
                        self.sync.fail(ticket);
                        Err(ViewError::from(e))
                    }
                };
                let unauthorized = matches!(reply, Err(ViewError::Unauthorized));
                if let Some(Reply::Create(tx)) = self.replies.remove(&ticket) {
                    let _ = tx.send(reply);
                }
                if unauthorized {
                    self.expire();
                }
            }
            Event::Deleted(ticket, result) => {
                let reply = match result {
                    Ok(()) => {
                        self.sync.confirm_delete(ticket);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(owner = %self.owner, error = %e, "view: delete failed; restoring");
                        self.sync.fail(ticket);
                        Err(ViewError::from(e))
                    }
                };
                let unauthorized = matches!(reply, Err(ViewError::Unauthorized));
                if let Some(Reply::Delete(tx)) = self.replies.remove(&ticket) {
                    let _ = tx.send(reply);
                }
                if unauthorized {
                    self.expire();
                }
            }
        }
    }

    /// Answer every waiting caller with `Unauthorized`; the run loop then ends.
    fn expire(&mut self) {
        self.expired = true;
        warn!(owner = %self.owner, "view: session rejected by platform; ending view");
        for (_, reply) in self.replies.drain() {
            match reply {
                Reply::Create(tx) => {
                    let _ = tx.send(Err(ViewError::Unauthorized));
                }
                Reply::Delete(tx) => {
                    let _ = tx.send(Err(ViewError::Unauthorized));
                }
            }
        }
        for command in self.deferred.drain(..) {
            match command {
                Command::Create { reply, .. } => {
                    let _ = reply.send(Err(ViewError::Unauthorized));
                }
                Command::Delete { reply, .. } => {
                    let _ = reply.send(Err(ViewError::Unauthorized));
                }
            }
        }
    }

    fn on_loaded(&mut self, result: Result<Vec<Bookmark>, StoreError>) {
        self.loading = false;
        match result {
            Ok(rows) => {
                info!(owner = %self.owner, count = rows.len(), "view: bookmarks loaded");
                self.sync.seed(rows);
                self.error = None;
            }
            Err(StoreError::Unauthorized(body)) => {
                warn!(owner = %self.owner, %body, "view: bookmark load unauthorized");
                self.expire();
                return;
            }
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "view: bookmark load failed");
                if self.sync.is_seeded() {
                    self.sync.abort_reload();
                } else {
                    self.sync.seed(Vec::new());
                }
                self.error = Some(e.to_string());
            }
        }

        while let Some(command) = self.deferred.pop_front() {
            self.on_command(command);
        }

        if std::mem::take(&mut self.reload_queued) {
            self.resync();
        }
    }

    fn on_change(&mut self, change: ChangeEvent) {
        match change {
            ChangeEvent::Insert(bookmark) => self.sync.apply_remote_insert(bookmark),
            ChangeEvent::Delete(id) => self.sync.apply_remote_delete(&id),
            ChangeEvent::Revoked => self.expire(),
            ChangeEvent::Resync => {
                if self.loading {
                    self.reload_queued = true;
                } else {
                    self.resync();
                }
            }
        }
    }

    fn resync(&mut self) {
        if self.sync.begin_reload() {
            debug!(owner = %self.owner, "view: resyncing");
            self.load();
        }
    }

    fn load(&mut self) {
        self.loading = true;
        let store = self.store.clone();
        let owner = self.owner.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.list_by_owner(&owner).await;
            let _ = events.send(Event::Loaded(result)).await;
        });
    }

    fn publish(&self) {
        let revision = self.sync.revision();
        let loaded = self.sync.is_seeded();
        let error = self.error.clone();
        self.snapshots.send_if_modified(|snapshot| {
            if snapshot.revision == revision && snapshot.loaded == loaded && snapshot.error == error {
                return false;
            }
            *snapshot = Snapshot { revision, bookmarks: self.sync.bookmarks().to_vec(), loaded, error };
            true
        });
    }
}

async fn next_change(subscription: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
