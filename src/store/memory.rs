// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::ban::BanRecord;
use crate::models::presence::PresenceRecord;
use crate::models::relation::{OutgoingEdge, RelationAttrs, RelationKind};
use crate::models::user::UserId;
use crate::store::{
    ChangeFeed, ChangeFilter, ChangeSubscription, RelationStore, StoreChange,
};

const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    /// (kind, actor) -> target -> (attrs, created_at)
    edges: HashMap<(RelationKind, UserId), HashMap<UserId, (RelationAttrs, NaiveDateTime)>>,
    /// Append-only ban history per user
    bans: HashMap<UserId, Vec<BanRecord>>,
    presence: HashMap<UserId, PresenceRecord>,
}

/// In-memory relation store. Backs the test suite and local development;
/// honors the same idempotency and change-feed contract as the Postgres
/// backend.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: ChangeFeed,
    fail_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            feed: ChangeFeed::new(FEED_CAPACITY),
            fail_writes: AtomicU32::new(0),
        }
    }

    /// Make the next `n` mutating calls fail with `Unavailable`. Test hook
    /// for retry and best-effort paths.
    pub fn inject_unavailable(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> Result<(), StoreError> {
        let remaining = self.fail_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn put(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
        attrs: RelationAttrs,
    ) -> Result<(), StoreError> {
        self.check_injected_failure()?;
        let seq = {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let targets = inner
                .edges
                .entry((kind, actor.clone()))
                .or_default();
            // Update attributes in place; the original created_at survives
            match targets.get_mut(target) {
                Some(existing) => existing.0 = attrs,
                None => {
                    targets.insert(target.clone(), (attrs, Utc::now().naive_utc()));
                }
            }
            self.feed.next_seq()
        };
        self.feed.publish(StoreChange::RelationPut {
            kind,
            actor: actor.clone(),
            target: target.clone(),
            attrs,
            seq,
        });
        Ok(())
    }

    async fn remove(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
    ) -> Result<(), StoreError> {
        self.check_injected_failure()?;
        let removed = {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            inner
                .edges
                .get_mut(&(kind, actor.clone()))
                .map(|targets| targets.remove(target).is_some())
                .unwrap_or(false)
        };
        // Removing a missing edge is a no-op success and publishes nothing
        if removed {
            let seq = self.feed.next_seq();
            self.feed.publish(StoreChange::RelationRemoved {
                kind,
                actor: actor.clone(),
                target: target.clone(),
                seq,
            });
        }
        Ok(())
    }

    async fn list_outgoing(
        &self,
        kind: RelationKind,
        actor: &UserId,
    ) -> Result<Vec<OutgoingEdge>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .edges
            .get(&(kind, actor.clone()))
            .map(|targets| {
                targets
                    .iter()
                    .map(|(target, (attrs, created_at))| OutgoingEdge {
                        target: target.clone(),
                        attrs: *attrs,
                        created_at: *created_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn exists(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .edges
            .get(&(kind, actor.clone()))
            .map(|targets| targets.contains_key(target))
            .unwrap_or(false))
    }

    async fn latest_ban(&self, user: &UserId) -> Result<Option<BanRecord>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .bans
            .get(user)
            .and_then(|rows| rows.iter().max_by_key(|r| r.created_at))
            .cloned())
    }

    async fn insert_ban(&self, record: BanRecord) -> Result<(), StoreError> {
        self.check_injected_failure()?;
        let seq = {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            inner
                .bans
                .entry(record.user.clone())
                .or_default()
                .push(record.clone());
            self.feed.next_seq()
        };
        self.feed.publish(StoreChange::BanUpserted { record, seq });
        Ok(())
    }

    async fn read_presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.presence.get(user).cloned())
    }

    async fn write_presence(
        &self,
        user: &UserId,
        is_online: bool,
        last_seen: NaiveDateTime,
    ) -> Result<(), StoreError> {
        self.check_injected_failure()?;
        let record = {
            let mut inner = self.inner.lock().expect("store lock poisoned");
            let record = PresenceRecord {
                user: user.clone(),
                is_online,
                last_seen,
                seq: self.feed.next_seq(),
            };
            inner.presence.insert(user.clone(), record.clone());
            record
        };
        self.feed.publish(StoreChange::PresenceUpdated { record });
        Ok(())
    }

    fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        self.feed.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ban::BanType;
    use crate::models::relation::MuteFlags;
    use crate::store::StoreTable;
    use chrono::Duration;
    use tokio_test::assert_ok;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn put_is_idempotent_and_keeps_one_row() {
        let store = MemoryStore::new();
        let (a, b) = (user("a"), user("b"));

        store
            .put(RelationKind::Block, &a, &b, RelationAttrs::default())
            .await
            .unwrap();
        store
            .put(RelationKind::Block, &a, &b, RelationAttrs::default())
            .await
            .unwrap();

        let edges = store.list_outgoing(RelationKind::Block, &a).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, b);
    }

    #[tokio::test]
    async fn put_updates_attributes_in_place() {
        let store = MemoryStore::new();
        let (a, b) = (user("a"), user("b"));

        store
            .put(RelationKind::Mute, &a, &b, MuteFlags::stories().into())
            .await
            .unwrap();
        store
            .put(RelationKind::Mute, &a, &b, MuteFlags::all().into())
            .await
            .unwrap();

        let edges = store.list_outgoing(RelationKind::Mute, &a).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].attrs.mute, MuteFlags::all());
    }

    #[tokio::test]
    async fn remove_of_missing_edge_is_success() {
        let store = MemoryStore::new();
        let (a, b) = (user("a"), user("b"));
        assert_ok!(store.remove(RelationKind::Block, &a, &b).await);
    }

    #[tokio::test]
    async fn latest_ban_is_newest_by_created_at() {
        let store = MemoryStore::new();
        let c = user("c");
        let now = Utc::now().naive_utc();

        store
            .insert_ban(BanRecord {
                user: c.clone(),
                reason: "first".to_string(),
                ban_type: BanType::Temporary,
                expires_at: Some(now + Duration::hours(1)),
                created_at: now - Duration::days(2),
            })
            .await
            .unwrap();
        store
            .insert_ban(BanRecord {
                user: c.clone(),
                reason: "second".to_string(),
                ban_type: BanType::Permanent,
                expires_at: None,
                created_at: now,
            })
            .await
            .unwrap();

        let latest = store.latest_ban(&c).await.unwrap().unwrap();
        assert_eq!(latest.reason, "second");
    }

    #[tokio::test]
    async fn subscription_filters_by_table_and_key() {
        let store = MemoryStore::new();
        let (a, b, other) = (user("a"), user("b"), user("x"));
        let mut sub = store.subscribe(ChangeFilter::key(StoreTable::BlockEdges, b.clone()));

        store
            .put(RelationKind::Mute, &a, &b, RelationAttrs::default())
            .await
            .unwrap();
        store
            .put(RelationKind::Block, &a, &other, RelationAttrs::default())
            .await
            .unwrap();
        store
            .put(RelationKind::Block, &a, &b, RelationAttrs::default())
            .await
            .unwrap();

        match sub.next().await.unwrap() {
            StoreChange::RelationPut { kind, actor, target, .. } => {
                assert_eq!(kind, RelationKind::Block);
                assert_eq!(actor, a);
                assert_eq!(target, b);
            }
            other => panic!("unexpected change: {:?}", other),
        }
    }

    #[tokio::test]
    async fn presence_writes_carry_monotonic_seq() {
        let store = MemoryStore::new();
        let e = user("e");
        let now = Utc::now().naive_utc();

        store.write_presence(&e, true, now).await.unwrap();
        let first = store.read_presence(&e).await.unwrap().unwrap();
        store.write_presence(&e, false, now).await.unwrap();
        let second = store.read_presence(&e).await.unwrap().unwrap();

        assert!(second.seq > first.seq);
        assert!(!second.is_online);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_unavailable() {
        let store = MemoryStore::new();
        let (a, b) = (user("a"), user("b"));
        store.inject_unavailable(1);

        let err = store
            .put(RelationKind::Block, &a, &b, RelationAttrs::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Next call succeeds again
        store
            .put(RelationKind::Block, &a, &b, RelationAttrs::default())
            .await
            .unwrap();
    }
}
