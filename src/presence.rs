// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Presence tracking: the local session's heartbeat state machine and
//! reference-counted watches over remote peers' presence rows.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::presence::PresenceRecord;
use crate::models::user::UserId;
use crate::store::{ChangeFilter, RelationStore, StoreChange, StoreTable};

struct WatchEntry {
    refcount: usize,
    rx: watch::Receiver<Option<PresenceRecord>>,
    task: JoinHandle<()>,
}

type WatchMap = Arc<Mutex<HashMap<UserId, WatchEntry>>>;

/// Handle on one watched peer's presence. All simultaneous watchers of the
/// same peer share a single store subscription; dropping the last handle
/// tears it down and no further events are delivered after drop returns.
pub struct PresenceWatch {
    peer: UserId,
    rx: watch::Receiver<Option<PresenceRecord>>,
    watches: WatchMap,
}

impl PresenceWatch {
    /// Latest observed presence, `None` until the seed read lands.
    pub fn current(&self) -> Option<PresenceRecord> {
        self.rx.borrow().clone()
    }

    /// Await the next presence update; `None` once the tracker is gone.
    pub async fn changed(&mut self) -> Option<PresenceRecord> {
        self.rx.changed().await.ok()?;
        self.rx.borrow().clone()
    }
}

impl Drop for PresenceWatch {
    fn drop(&mut self) {
        let mut watches = self.watches.lock().expect("watch map poisoned");
        if let Some(entry) = watches.get_mut(&self.peer) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                let entry = watches.remove(&self.peer).expect("entry vanished");
                entry.task.abort();
                debug!("tore down presence subscription for {}", self.peer);
            }
        }
    }
}

/// Maintains the local user's "I am active" heartbeat and observes peers.
///
/// Local state machine: `Offline -> Active` on start/sign-in, re-asserted
/// every heartbeat interval and on visibility regain; `Active -> Offline`
/// on hide, on sign-out, and best-effort on unload. A failed unload write
/// is never retried; the server-side disconnect fallback corrects the row.
pub struct PresenceTracker {
    store: Arc<dyn RelationStore>,
    user: UserId,
    heartbeat: Duration,
    active: Arc<AtomicBool>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    watches: WatchMap,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RelationStore>, user: UserId, heartbeat: Duration) -> Self {
        Self {
            store,
            user,
            heartbeat,
            active: Arc::new(AtomicBool::new(false)),
            heartbeat_task: Mutex::new(None),
            watches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn write(&self, is_online: bool) -> Result<(), StoreError> {
        self.store
            .write_presence(&self.user, is_online, Utc::now().naive_utc())
            .await
    }

    /// `Offline -> Active`: assert presence now and start the heartbeat.
    pub async fn start(&self) -> Result<(), StoreError> {
        self.active.store(true, Ordering::SeqCst);
        self.write(true).await?;

        let store = self.store.clone();
        let user = self.user.clone();
        let active = self.active.clone();
        let period = self.heartbeat;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately; already written
            loop {
                ticker.tick().await;
                if !active.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(e) = store
                    .write_presence(&user, true, Utc::now().naive_utc())
                    .await
                {
                    // Heartbeats are re-asserted next tick; just record it
                    warn!("presence heartbeat for {} failed: {}", user, e);
                }
            }
        });

        let mut slot = self.heartbeat_task.lock().expect("heartbeat slot poisoned");
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
        Ok(())
    }

    /// Visibility regained: re-assert immediately.
    pub async fn mark_active(&self) -> Result<(), StoreError> {
        self.active.store(true, Ordering::SeqCst);
        self.write(true).await
    }

    /// Tab or window hidden: `Active -> Offline`, heartbeat pauses.
    pub async fn mark_hidden(&self) -> Result<(), StoreError> {
        self.active.store(false, Ordering::SeqCst);
        self.write(false).await
    }

    /// Explicit sign-out: stop the heartbeat and go offline.
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.heartbeat_task.lock().expect("heartbeat slot poisoned").take() {
            task.abort();
        }
        self.write(false).await
    }

    /// Unload path: one offline write, never retried. A stale online row
    /// left behind is corrected by the server-side disconnect fallback.
    pub async fn flush_offline_best_effort(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Err(e) = self.write(false).await {
            debug!("best-effort offline write for {} failed: {}", self.user, e);
        }
    }

    /// Watch a peer's presence. Seeded with a point-in-time read, then fed
    /// by the store's push feed in server-assigned order; stale pushes are
    /// dropped. Watchers of the same peer share one subscription.
    pub fn watch(&self, peer: &UserId) -> PresenceWatch {
        let mut watches = self.watches.lock().expect("watch map poisoned");

        if let Some(entry) = watches.get_mut(peer) {
            entry.refcount += 1;
            return PresenceWatch {
                peer: peer.clone(),
                rx: entry.rx.clone(),
                watches: self.watches.clone(),
            };
        }

        let (tx, rx) = watch::channel(None);
        // Subscribe before the seed read so no write can fall in between
        let mut sub = self.store.subscribe(ChangeFilter::key(
            StoreTable::PresenceRecords,
            peer.clone(),
        ));
        let store = self.store.clone();
        let watched = peer.clone();
        let task = tokio::spawn(async move {
            let mut last_seq = 0i64;
            match store.read_presence(&watched).await {
                Ok(Some(record)) => {
                    last_seq = record.seq;
                    let _ = tx.send(Some(record));
                }
                Ok(None) => {}
                Err(e) => warn!("presence seed read for {} failed: {}", watched, e),
            }
            while let Some(change) = sub.next().await {
                if let StoreChange::PresenceUpdated { record } = change {
                    // Last write wins by store order, not client clocks
                    if record.seq > last_seq {
                        last_seq = record.seq;
                        if tx.send(Some(record)).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        watches.insert(
            peer.clone(),
            WatchEntry {
                refcount: 1,
                rx: rx.clone(),
                task,
            },
        );
        PresenceWatch {
            peer: peer.clone(),
            rx,
            watches: self.watches.clone(),
        }
    }

    #[cfg(test)]
    fn subscription_count(&self) -> usize {
        self.watches.lock().expect("watch map poisoned").len()
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat_task.lock().expect("heartbeat slot poisoned").take() {
            task.abort();
        }
        let mut watches = self.watches.lock().expect("watch map poisoned");
        for (_, entry) in watches.drain() {
            entry.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn tracker(store: &Arc<MemoryStore>, id: &str) -> PresenceTracker {
        PresenceTracker::new(store.clone(), UserId::new(id), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn start_asserts_online_presence() {
        let store = Arc::new(MemoryStore::new());
        let t = tracker(&store, "e");
        t.start().await.unwrap();

        let record = store.read_presence(&UserId::new("e")).await.unwrap().unwrap();
        assert!(record.is_online);
    }

    #[tokio::test]
    async fn hide_then_regain_round_trips_the_state_machine() {
        let store = Arc::new(MemoryStore::new());
        let e = UserId::new("e");
        let t = tracker(&store, "e");

        t.start().await.unwrap();
        t.mark_hidden().await.unwrap();
        assert!(!store.read_presence(&e).await.unwrap().unwrap().is_online);

        t.mark_active().await.unwrap();
        assert!(store.read_presence(&e).await.unwrap().unwrap().is_online);
    }

    #[tokio::test]
    async fn watcher_sees_peer_going_online_and_offline() {
        let store = Arc::new(MemoryStore::new());
        let watcher = tracker(&store, "d");
        let peer = tracker(&store, "e");

        let mut watch = watcher.watch(&UserId::new("e"));
        peer.start().await.unwrap();
        let seen = watch.changed().await.unwrap();
        assert!(seen.is_online);

        peer.mark_hidden().await.unwrap();
        let seen = watch.changed().await.unwrap();
        assert!(!seen.is_online);
    }

    #[tokio::test]
    async fn watch_is_seeded_with_point_in_time_read() {
        let store = Arc::new(MemoryStore::new());
        let peer = tracker(&store, "e");
        peer.start().await.unwrap();

        let watcher = tracker(&store, "d");
        let mut watch = watcher.watch(&UserId::new("e"));
        // The seed arrives as the first observed value
        let seen = watch.changed().await.unwrap();
        assert!(seen.is_online);
    }

    #[tokio::test]
    async fn simultaneous_watchers_share_one_subscription() {
        let store = Arc::new(MemoryStore::new());
        let watcher = tracker(&store, "d");
        let e = UserId::new("e");

        let w1 = watcher.watch(&e);
        let w2 = watcher.watch(&e);
        assert_eq!(watcher.subscription_count(), 1);

        drop(w1);
        assert_eq!(watcher.subscription_count(), 1);
        drop(w2);
        assert_eq!(watcher.subscription_count(), 0);
    }

    #[tokio::test]
    async fn best_effort_offline_flush_swallows_failures() {
        let store = Arc::new(MemoryStore::new());
        let t = tracker(&store, "e");
        t.start().await.unwrap();

        store.inject_unavailable(1);
        // Must not error or retry; the row stays stale until the server
        // disconnect fallback rewrites it
        t.flush_offline_best_effort().await;
        assert!(store.read_presence(&UserId::new("e")).await.unwrap().unwrap().is_online);

        // Server-side fallback corrects the row and watchers converge
        store
            .write_presence(&UserId::new("e"), false, Utc::now().naive_utc())
            .await
            .unwrap();
        assert!(!store.read_presence(&UserId::new("e")).await.unwrap().unwrap().is_online);
    }
}
