// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::StoreError;
use crate::models::ban::{BanRecord, BanType};
use crate::models::user::UserId;
use crate::store::RelationStore;

/// What a suspended session may still do: nothing beyond reaching support
/// and signing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    ContactSupport,
    SignOut,
}

/// Whether the current session holder is under an active suspension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BanStatus {
    Clear,
    Suspended {
        reason: String,
        ban_type: BanType,
        expires_at: Option<NaiveDateTime>,
    },
}

impl BanStatus {
    pub fn is_suspended(&self) -> bool {
        matches!(self, BanStatus::Suspended { .. })
    }

    /// Actions the host application may offer in this state.
    pub fn permitted_actions(&self) -> &'static [SessionAction] {
        match self {
            BanStatus::Clear => &[],
            BanStatus::Suspended { .. } => {
                &[SessionAction::ContactSupport, SessionAction::SignOut]
            }
        }
    }
}

/// Two-state gate over the current user's ban table.
///
/// The latest ban row is cached; the active-ban invariant is re-applied at
/// every status query, so a temporary ban flips to `Clear` at its expiry
/// without a background sweep. A fresh read happens at session bootstrap
/// and whenever the gatekeeper sees a ban-table push for this user.
/// Suspension is a property of the account, not the session: signing out
/// and back in re-runs the same evaluation.
pub struct BanGate {
    store: Arc<dyn RelationStore>,
    user: UserId,
    record: RwLock<Option<BanRecord>>,
}

impl BanGate {
    pub fn new(store: Arc<dyn RelationStore>, user: UserId) -> Self {
        Self {
            store,
            user,
            record: RwLock::new(None),
        }
    }

    /// Fresh read of the latest ban row, then report the current status.
    pub async fn refresh(&self) -> Result<BanStatus, StoreError> {
        let latest = self.store.latest_ban(&self.user).await?;
        {
            let mut record = self.record.write().expect("gate lock poisoned");
            *record = latest;
        }
        let status = self.status();
        if status.is_suspended() {
            info!("session for {} is suspended", self.user);
        }
        Ok(status)
    }

    /// Current status from the cached row, invariant applied lazily at call
    /// time. Absence of a row means `Clear`.
    pub fn status(&self) -> BanStatus {
        let record = self.record.read().expect("gate lock poisoned");
        match record.as_ref() {
            Some(rec) if rec.is_active(Utc::now().naive_utc()) => BanStatus::Suspended {
                reason: rec.reason.clone(),
                ban_type: rec.ban_type,
                expires_at: rec.expires_at,
            },
            _ => BanStatus::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn ban(user: &UserId, ban_type: BanType, expires_at: Option<NaiveDateTime>) -> BanRecord {
        BanRecord {
            user: user.clone(),
            reason: "tos violation".to_string(),
            ban_type,
            expires_at,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn clear_without_any_ban_row() {
        let store = Arc::new(MemoryStore::new());
        let gate = BanGate::new(store, UserId::new("u"));
        assert_eq!(gate.refresh().await.unwrap(), BanStatus::Clear);
    }

    #[tokio::test]
    async fn permanent_ban_suspends_with_support_and_signout_only() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u");
        store
            .insert_ban(ban(&user, BanType::Permanent, None))
            .await
            .unwrap();

        let gate = BanGate::new(store, user);
        let status = gate.refresh().await.unwrap();
        assert!(status.is_suspended());
        assert_eq!(
            status.permitted_actions(),
            &[SessionAction::ContactSupport, SessionAction::SignOut]
        );
    }

    #[tokio::test]
    async fn expired_temporary_ban_reads_clear_without_fresh_fetch() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u");
        let now = Utc::now().naive_utc();
        store
            .insert_ban(ban(&user, BanType::Temporary, Some(now - Duration::seconds(1))))
            .await
            .unwrap();

        let gate = BanGate::new(store, user);
        // The row exists and is fetched, but the invariant says inert
        assert_eq!(gate.refresh().await.unwrap(), BanStatus::Clear);
        assert_eq!(gate.status(), BanStatus::Clear);
    }

    #[tokio::test]
    async fn newest_row_supersedes_older_active_ban() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new("u");
        let now = Utc::now().naive_utc();

        let mut old = ban(&user, BanType::Permanent, None);
        old.created_at = now - Duration::days(10);
        store.insert_ban(old).await.unwrap();
        // Newer temporary row that has already lapsed
        store
            .insert_ban(ban(&user, BanType::Temporary, Some(now - Duration::hours(1))))
            .await
            .unwrap();

        let gate = BanGate::new(store, user);
        assert_eq!(gate.refresh().await.unwrap(), BanStatus::Clear);
    }
}
