// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! The per-session facade: binds a session context to the relation store,
//! the relationship cache, the ban gate and the presence tracker, and
//! exposes the permission API the UI layer consumes.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::RelationshipCache;
use crate::config::Config;
use crate::error::StoreError;
use crate::evaluator::{self, Decision, Interaction, PairSnapshot, Surface};
use crate::gate::{BanGate, BanStatus};
use crate::metrics;
use crate::models::relation::{RelationAttrs, RelationKind};
use crate::models::user::UserId;
use crate::presence::{PresenceTracker, PresenceWatch};
use crate::store::{ChangeFilter, RelationStore, StoreTable};

/// Explicit session identity handed to the gatekeeper at bootstrap. No
/// ambient process-wide session exists.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user: UserId,
    /// Administrators still see suspended users' content.
    pub is_admin: bool,
}

impl SessionContext {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            is_admin: false,
        }
    }
}

type MutationLocks = tokio::sync::Mutex<HashMap<(RelationKind, UserId), Arc<tokio::sync::Mutex<()>>>>;

/// One signed-in session's view of the relationship graph.
pub struct Gatekeeper {
    session: SessionContext,
    store: Arc<dyn RelationStore>,
    cache: RelationshipCache,
    gate: Arc<BanGate>,
    presence: PresenceTracker,
    mutation_locks: MutationLocks,
    ban_listener: JoinHandle<()>,
}

impl Gatekeeper {
    /// Bootstrap a session: evaluate the ban gate, mirror the actor's
    /// outgoing relations, start the presence heartbeat (skipped while
    /// suspended) and begin listening for ban-table pushes.
    pub async fn bootstrap(
        session: SessionContext,
        store: Arc<dyn RelationStore>,
    ) -> Result<Self, StoreError> {
        let config = Config::get();
        let user = session.user.clone();

        let gate = Arc::new(BanGate::new(store.clone(), user.clone()));
        let status = gate.refresh().await?;

        let cache = RelationshipCache::new(store.clone(), user.clone());
        cache.refresh().await?;

        let presence = PresenceTracker::new(
            store.clone(),
            user.clone(),
            Duration::from_secs(config.presence.heartbeat_interval_secs),
        );
        // A suspended session renders the notice screen only; it neither
        // advertises presence nor interacts until the gate clears.
        if !status.is_suspended() {
            presence.start().await?;
        }

        let mut sub = store.subscribe(ChangeFilter::key(StoreTable::BanRecords, user.clone()));
        let listener_gate = gate.clone();
        let ban_listener = tokio::spawn(async move {
            while sub.next().await.is_some() {
                if let Err(e) = listener_gate.refresh().await {
                    warn!("ban gate refresh after push failed: {}", e);
                }
            }
        });

        debug!("bootstrapped gatekeeper session for {}", session.user);
        Ok(Self {
            session,
            store,
            cache,
            gate,
            presence,
            mutation_locks: tokio::sync::Mutex::new(HashMap::new()),
            ban_listener,
        })
    }

    pub fn user(&self) -> &UserId {
        &self.session.user
    }

    /// Current suspension state of this session's account.
    pub fn current_ban_status(&self) -> BanStatus {
        self.gate.status()
    }

    /// Decide one interaction against one target, from a fresh pair
    /// snapshot. The actor's own edges come from the cache; the target's
    /// reverse edges and ban state are read from the store each time since
    /// incoming relations are never cached client-side.
    pub async fn evaluate(
        &self,
        target: &UserId,
        interaction: Interaction,
    ) -> Result<Decision, StoreError> {
        let snapshot = self.snapshot(target, interaction).await?;
        let decision = evaluator::evaluate(interaction, &snapshot);
        metrics::record_decision(interaction, &decision);
        Ok(decision)
    }

    async fn snapshot(
        &self,
        target: &UserId,
        interaction: Interaction,
    ) -> Result<PairSnapshot, StoreError> {
        let actor = &self.session.user;

        let (target_ban, target_blocks_actor, target_restricts_actor) = futures::try_join!(
            self.store.latest_ban(target),
            self.store.exists(RelationKind::Block, target, actor),
            self.store.exists(RelationKind::Restrict, target, actor),
        )?;

        // Presence is only displayed on the DM surface; skip the read
        // everywhere else
        let target_presence = if interaction == Interaction::SendMessage {
            self.store.read_presence(target).await?
        } else {
            None
        };

        let now = Utc::now().naive_utc();
        Ok(PairSnapshot {
            actor_suspended: self.gate.status().is_suspended(),
            target_suspended: target_ban.map(|b| b.is_active(now)).unwrap_or(false),
            actor_is_admin: self.session.is_admin,
            actor_blocks_target: self.cache.blocks(target),
            target_blocks_actor,
            target_restricts_actor,
            mute: self.cache.mute_of(target),
            target_presence,
        })
    }

    /// Create, update or delete one of the actor's outgoing edges.
    /// `Some(attrs)` puts, `None` removes. Mutations for the same
    /// (kind, target) are serialized so a racing put/remove pair resolves
    /// to whichever reached the store last; the cache is re-fetched after
    /// the write lands (read-after-write).
    pub async fn set_relation(
        &self,
        kind: RelationKind,
        target: &UserId,
        attrs: Option<RelationAttrs>,
    ) -> Result<(), StoreError> {
        let lock = self.mutation_lock(kind, target).await;
        let _guard = lock.lock().await;

        let actor = self.session.user.clone();
        let target = target.clone();
        let store = self.store.clone();
        let result = with_retry(|| {
            let store = store.clone();
            let actor = actor.clone();
            let target = target.clone();
            async move {
                match attrs {
                    Some(attrs) => store.put(kind, &actor, &target, attrs).await,
                    None => store.remove(kind, &actor, &target).await,
                }
            }
        })
        .await;

        let outcome = match result {
            Ok(()) => self.cache.refresh().await,
            Err(e) => {
                metrics::record_store_error("set_relation");
                Err(e)
            }
        };

        drop(_guard);
        self.release_mutation_lock(kind, &target, lock).await;
        outcome
    }

    async fn mutation_lock(
        &self,
        kind: RelationKind,
        target: &UserId,
    ) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.mutation_locks.lock().await;
        locks
            .entry((kind, target.clone()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no other mutation for the same
    /// (kind, target) holds or awaits it, so the table stays bounded by
    /// in-flight mutations rather than growing per pair touched.
    async fn release_mutation_lock(
        &self,
        kind: RelationKind,
        target: &UserId,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) {
        let mut locks = self.mutation_locks.lock().await;
        // Two strong handles means the map's entry plus ours; any waiter
        // would hold a third and runs this same check on its way out
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&(kind, target.clone()));
        }
    }

    /// Authors excluded from one of the actor's aggregated feeds
    /// (blocked, plus muted for the surface). O(set size), no I/O.
    pub fn excluded_authors(&self, surface: Surface) -> HashSet<UserId> {
        self.cache.excluded_authors(surface)
    }

    /// Whether this session's user restricts the target. The target's
    /// comments and messages are held for this user's approval, and the
    /// target is never told. O(1), no I/O.
    pub fn restricts(&self, target: &UserId) -> bool {
        self.cache.restricts(target)
    }

    /// Whether a block in either direction hides this pair from search
    /// and explore surfaces.
    pub async fn is_hidden_pair(&self, a: &UserId, b: &UserId) -> Result<bool, StoreError> {
        let (ab, ba) = futures::try_join!(
            self.store.exists(RelationKind::Block, a, b),
            self.store.exists(RelationKind::Block, b, a),
        )?;
        Ok(ab || ba)
    }

    /// Watch a peer's live presence. Dropping the handle unwatches.
    pub fn watch_presence(&self, peer: &UserId) -> PresenceWatch {
        self.presence.watch(peer)
    }

    /// Visibility regained: re-assert presence.
    pub async fn mark_active(&self) -> Result<(), StoreError> {
        self.presence.mark_active().await
    }

    /// Tab or window hidden: drop to offline until visibility returns.
    pub async fn mark_hidden(&self) -> Result<(), StoreError> {
        self.presence.mark_hidden().await
    }

    /// Re-fetch cached state after a reconnect.
    pub async fn resync(&self) -> Result<(), StoreError> {
        self.cache.refresh().await?;
        self.gate.refresh().await?;
        Ok(())
    }

    /// Tear the session down: presence goes offline and the heartbeat
    /// stops. Ban evaluation re-runs on the next sign-in.
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        self.presence.sign_out().await
    }

    #[cfg(test)]
    async fn mutation_lock_count(&self) -> usize {
        self.mutation_locks.lock().await.len()
    }
}

impl Drop for Gatekeeper {
    fn drop(&mut self) {
        self.ban_listener.abort();
    }
}

/// Retry an idempotent store write on `Unavailable` with doubling backoff.
/// `Conflict` and `NotFound` are success by the store contract.
async fn with_retry<F, Fut>(mut op: F) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let config = Config::get();
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_idempotent_success() => return Ok(()),
            Err(e) if e.is_retryable() && attempt < config.store.max_retries => {
                attempt += 1;
                let delay = config.store.retry_backoff_ms * 2u64.pow(attempt - 1);
                debug!("store write unavailable, retry {} in {}ms: {}", attempt, delay, e);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::relation::MuteFlags;
    use crate::store::memory::MemoryStore;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    async fn session(store: &Arc<MemoryStore>, id: &str) -> Gatekeeper {
        Gatekeeper::bootstrap(SessionContext::new(user(id)), store.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_relation_retries_past_transient_unavailability() {
        let store = Arc::new(MemoryStore::new());
        let gk = session(&store, "a").await;

        store.inject_unavailable(1);
        gk.set_relation(RelationKind::Block, &user("b"), Some(RelationAttrs::default()))
            .await
            .unwrap();
        assert!(store
            .exists(RelationKind::Block, &user("a"), &user("b"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mutations_refresh_the_cache_read_after_write() {
        let store = Arc::new(MemoryStore::new());
        let gk = session(&store, "a").await;
        let b = user("b");

        gk.set_relation(RelationKind::Block, &b, Some(RelationAttrs::default()))
            .await
            .unwrap();
        assert!(gk.excluded_authors(Surface::PostFeed).contains(&b));

        gk.set_relation(RelationKind::Block, &b, None).await.unwrap();
        assert!(!gk.excluded_authors(Surface::PostFeed).contains(&b));
    }

    #[tokio::test]
    async fn restricts_reports_only_the_restrictors_own_edge() {
        let store = Arc::new(MemoryStore::new());
        let gk_a = session(&store, "a").await;
        let gk_b = session(&store, "b").await;
        let (a, b) = (user("a"), user("b"));

        gk_a.set_relation(RelationKind::Restrict, &b, Some(RelationAttrs::default()))
            .await
            .unwrap();
        assert!(gk_a.restricts(&b));
        // The restricted side has no view of the edge from their session
        assert!(!gk_b.restricts(&a));

        gk_a.set_relation(RelationKind::Restrict, &b, None).await.unwrap();
        assert!(!gk_a.restricts(&b));
    }

    #[tokio::test]
    async fn mutation_locks_are_released_after_each_write() {
        let store = Arc::new(MemoryStore::new());
        let gk = session(&store, "a").await;

        gk.set_relation(RelationKind::Block, &user("b"), Some(RelationAttrs::default()))
            .await
            .unwrap();
        gk.set_relation(RelationKind::Mute, &user("c"), Some(MuteFlags::all().into()))
            .await
            .unwrap();
        gk.set_relation(RelationKind::Block, &user("b"), None).await.unwrap();

        assert_eq!(gk.mutation_lock_count().await, 0);
    }

    #[tokio::test]
    async fn bootstrap_advertises_presence_for_clear_sessions() {
        let store = Arc::new(MemoryStore::new());
        let _gk = session(&store, "a").await;
        let record = store.read_presence(&user("a")).await.unwrap().unwrap();
        assert!(record.is_online);
    }
}
