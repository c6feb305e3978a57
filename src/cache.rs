// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::evaluator::{feed_excluded, Surface};
use crate::models::relation::{MuteFlags, RelationKind};
use crate::models::user::UserId;
use crate::store::RelationStore;

#[derive(Default)]
struct CacheState {
    epoch: u64,
    blocked: HashSet<UserId>,
    muted: HashMap<UserId, MuteFlags>,
    restricted: HashSet<UserId>,
}

/// Per-session mirror of the actor's own outgoing relation sets. Incoming
/// edges are deliberately absent: who blocks or restricts the actor is
/// never held client-side. Ban state lives in the gate, not here.
///
/// Refresh is a full re-fetch (read-after-write, no incremental patching);
/// a generation counter drops results of fetches that were overtaken, so a
/// slow response never overwrites newer state.
pub struct RelationshipCache {
    store: Arc<dyn RelationStore>,
    user: UserId,
    state: RwLock<CacheState>,
    generation: AtomicU64,
}

impl RelationshipCache {
    pub fn new(store: Arc<dyn RelationStore>, user: UserId) -> Self {
        Self {
            store,
            user,
            state: RwLock::new(CacheState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Re-fetch all three outgoing edge sets.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let epoch = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (blocks, mutes, restricts) = futures::try_join!(
            self.store.list_outgoing(RelationKind::Block, &self.user),
            self.store.list_outgoing(RelationKind::Mute, &self.user),
            self.store.list_outgoing(RelationKind::Restrict, &self.user),
        )?;

        let mut state = self.state.write().expect("cache lock poisoned");
        if state.epoch >= epoch {
            // A newer refresh already landed; this result is stale
            debug!("dropping stale cache refresh for {}", self.user);
            return Ok(());
        }
        state.epoch = epoch;
        state.blocked = blocks.into_iter().map(|e| e.target).collect();
        state.muted = mutes.into_iter().map(|e| (e.target, e.attrs.mute)).collect();
        state.restricted = restricts.into_iter().map(|e| e.target).collect();
        Ok(())
    }

    /// O(1): does this session's user block the target?
    pub fn blocks(&self, target: &UserId) -> bool {
        self.state
            .read()
            .expect("cache lock poisoned")
            .blocked
            .contains(target)
    }

    /// O(1): the user's mute flags for the target, if muted.
    pub fn mute_of(&self, target: &UserId) -> Option<MuteFlags> {
        self.state
            .read()
            .expect("cache lock poisoned")
            .muted
            .get(target)
            .copied()
    }

    /// O(1): does this session's user restrict the target?
    pub fn restricts(&self, target: &UserId) -> bool {
        self.state
            .read()
            .expect("cache lock poisoned")
            .restricted
            .contains(target)
    }

    /// Authors excluded from one of the user's aggregated feeds: everyone
    /// blocked, plus everyone muted for that surface.
    pub fn excluded_authors(&self, surface: Surface) -> HashSet<UserId> {
        let state = self.state.read().expect("cache lock poisoned");
        let mut excluded = state.blocked.clone();
        for (target, flags) in &state.muted {
            if feed_excluded(*flags, surface) {
                excluded.insert(target.clone());
            }
        }
        excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::relation::RelationAttrs;
    use crate::store::memory::MemoryStore;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    async fn cache_with_store() -> (Arc<MemoryStore>, RelationshipCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = RelationshipCache::new(store.clone(), user("me"));
        (store, cache)
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn refresh_mirrors_outgoing_edges() {
        let (store, cache) = cache_with_store().await;
        let me = user("me");

        store
            .put(RelationKind::Block, &me, &user("b"), RelationAttrs::default())
            .await
            .unwrap();
        store
            .put(RelationKind::Mute, &me, &user("m"), MuteFlags::all().into())
            .await
            .unwrap();
        store
            .put(RelationKind::Restrict, &me, &user("r"), RelationAttrs::default())
            .await
            .unwrap();

        assert!(!cache.blocks(&user("b")));
        cache.refresh().await.unwrap();

        assert!(cache.blocks(&user("b")));
        assert_eq!(cache.mute_of(&user("m")), Some(MuteFlags::all()));
        assert!(cache.restricts(&user("r")));
        assert!(!cache.restricts(&user("b")));
    }

    #[tokio::test]
    async fn refresh_drops_removed_edges() {
        let (store, cache) = cache_with_store().await;
        let me = user("me");

        store
            .put(RelationKind::Block, &me, &user("b"), RelationAttrs::default())
            .await
            .unwrap();
        cache.refresh().await.unwrap();
        assert!(cache.blocks(&user("b")));

        store.remove(RelationKind::Block, &me, &user("b")).await.unwrap();
        cache.refresh().await.unwrap();
        assert!(!cache.blocks(&user("b")));
    }

    #[tokio::test]
    async fn excluded_authors_composes_blocks_and_surface_mutes() {
        let (store, cache) = cache_with_store().await;
        let me = user("me");

        store
            .put(RelationKind::Block, &me, &user("b"), RelationAttrs::default())
            .await
            .unwrap();
        store
            .put(RelationKind::Mute, &me, &user("s"), MuteFlags::stories().into())
            .await
            .unwrap();
        cache.refresh().await.unwrap();

        let story_feed = cache.excluded_authors(Surface::StoryFeed);
        assert!(story_feed.contains(&user("b")));
        assert!(story_feed.contains(&user("s")));

        // A stories-only mute leaves the post feed alone; the block does not
        let post_feed = cache.excluded_authors(Surface::PostFeed);
        assert!(post_feed.contains(&user("b")));
        assert!(!post_feed.contains(&user("s")));
    }
}
