// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::StoreError;
use crate::models::ban::BanRecord;
use crate::models::presence::PresenceRecord;
use crate::models::relation::{OutgoingEdge, RelationAttrs, RelationKind};
use crate::models::user::UserId;

/// Logical tables exposed by the backing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTable {
    BlockEdges,
    MuteEdges,
    RestrictEdges,
    BanRecords,
    PresenceRecords,
}

impl From<RelationKind> for StoreTable {
    fn from(kind: RelationKind) -> Self {
        match kind {
            RelationKind::Block => StoreTable::BlockEdges,
            RelationKind::Mute => StoreTable::MuteEdges,
            RelationKind::Restrict => StoreTable::RestrictEdges,
        }
    }
}

/// One push from the store's change feed. `seq` is assigned by the store,
/// monotonic per feed, so consumers order writes without trusting client
/// clocks.
#[derive(Debug, Clone)]
pub enum StoreChange {
    RelationPut {
        kind: RelationKind,
        actor: UserId,
        target: UserId,
        attrs: RelationAttrs,
        seq: i64,
    },
    RelationRemoved {
        kind: RelationKind,
        actor: UserId,
        target: UserId,
        seq: i64,
    },
    BanUpserted {
        record: BanRecord,
        seq: i64,
    },
    PresenceUpdated {
        record: PresenceRecord,
    },
}

impl StoreChange {
    pub fn table(&self) -> StoreTable {
        match self {
            StoreChange::RelationPut { kind, .. } => (*kind).into(),
            StoreChange::RelationRemoved { kind, .. } => (*kind).into(),
            StoreChange::BanUpserted { .. } => StoreTable::BanRecords,
            StoreChange::PresenceUpdated { .. } => StoreTable::PresenceRecords,
        }
    }

    pub fn seq(&self) -> i64 {
        match self {
            StoreChange::RelationPut { seq, .. } => *seq,
            StoreChange::RelationRemoved { seq, .. } => *seq,
            StoreChange::BanUpserted { seq, .. } => *seq,
            StoreChange::PresenceUpdated { record } => record.seq,
        }
    }
}

/// Filter for a push subscription: one table, optionally narrowed to rows
/// touching a single user (either end of a relation edge).
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub table: StoreTable,
    pub key: Option<UserId>,
}

impl ChangeFilter {
    pub fn table(table: StoreTable) -> Self {
        Self { table, key: None }
    }

    pub fn key(table: StoreTable, user: UserId) -> Self {
        Self {
            table,
            key: Some(user),
        }
    }

    fn matches(&self, change: &StoreChange) -> bool {
        if change.table() != self.table {
            return false;
        }
        let Some(key) = &self.key else {
            return true;
        };
        match change {
            StoreChange::RelationPut { actor, target, .. }
            | StoreChange::RelationRemoved { actor, target, .. } => {
                actor == key || target == key
            }
            StoreChange::BanUpserted { record, .. } => &record.user == key,
            StoreChange::PresenceUpdated { record } => &record.user == key,
        }
    }
}

/// Handle for a push subscription. Events arrive in feed order; dropping
/// the handle cancels delivery, no event is observed after drop returns.
pub struct ChangeSubscription {
    rx: broadcast::Receiver<StoreChange>,
    filter: ChangeFilter,
}

impl ChangeSubscription {
    /// Await the next matching change; `None` once the store is gone.
    pub async fn next(&mut self) -> Option<StoreChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Consumers re-seed from a point read, so a gap is
                    // survivable; surface it for diagnostics.
                    warn!("change subscription lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Shared fan-out feed used by store implementations: a broadcast channel
/// plus the store-assigned sequence counter.
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<StoreChange>,
    seq: AtomicI64,
}

impl ChangeFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    pub(crate) fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn publish(&self, change: StoreChange) {
        // Send fails only when no subscriber exists, which is fine
        let _ = self.tx.send(change);
    }

    pub(crate) fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// Narrow persistence boundary over the four relation tables and presence.
///
/// No policy lives here; every operation is idempotent so the evaluator and
/// session logic stay independently testable against [`memory::MemoryStore`].
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Create or update an outgoing edge. Idempotent: a second `put` for
    /// the same ordered pair updates attributes instead of erroring.
    async fn put(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
        attrs: RelationAttrs,
    ) -> Result<(), StoreError>;

    /// Delete an outgoing edge. Removing a non-existent edge is success.
    async fn remove(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
    ) -> Result<(), StoreError>;

    /// All outgoing edges of one kind for an actor.
    async fn list_outgoing(
        &self,
        kind: RelationKind,
        actor: &UserId,
    ) -> Result<Vec<OutgoingEdge>, StoreError>;

    /// Membership test for one ordered pair.
    async fn exists(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
    ) -> Result<bool, StoreError>;

    /// The most recently created ban row for a user, active or not.
    async fn latest_ban(&self, user: &UserId) -> Result<Option<BanRecord>, StoreError>;

    /// Append a ban row. Administrative write path; rows are never deleted.
    async fn insert_ban(&self, record: BanRecord) -> Result<(), StoreError>;

    /// Point-in-time read of a user's presence row.
    async fn read_presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, StoreError>;

    /// Overwrite a user's presence row. The store assigns the write order.
    async fn write_presence(
        &self,
        user: &UserId,
        is_online: bool,
        last_seen: NaiveDateTime,
    ) -> Result<(), StoreError>;

    /// Open a push subscription filtered by table and key.
    fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription;
}
