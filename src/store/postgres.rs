// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use tracing::debug;

use crate::db::{Database, DbConnection};
use crate::error::StoreError;
use crate::models::ban::{BanRecord, BanRow, NewBanRow};
use crate::models::presence::{NewPresenceRow, PresenceRecord, PresenceRow};
use crate::models::relation::{
    MuteEdge, NewBlockEdge, NewMuteEdge, NewRestrictEdge, OutgoingEdge, RelationAttrs,
    RelationKind,
};
use crate::models::user::UserId;
use crate::schema::{ban_records, block_edges, mute_edges, presence_records, restrict_edges};
use crate::store::{
    ChangeFeed, ChangeFilter, ChangeSubscription, RelationStore, StoreChange,
};

const FEED_CAPACITY: usize = 1024;

/// Postgres-backed relation store.
///
/// Presence rows carry a true server-assigned `seq`, incremented inside the
/// upsert. Relation and ban change stamps come from a per-process sequence,
/// an accepted approximation of server ordering (see DESIGN.md).
pub struct PostgresRelationStore {
    db: Arc<Database>,
    feed: ChangeFeed,
}

impl PostgresRelationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(FEED_CAPACITY),
        }
    }

    async fn conn(&self) -> Result<DbConnection, StoreError> {
        self.db
            .get_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn map_diesel_error(e: DieselError) -> StoreError {
    match e {
        DieselError::NotFound => StoreError::NotFound("row not found".to_string()),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl RelationStore for PostgresRelationStore {
    async fn put(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
        attrs: RelationAttrs,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let now = Utc::now().naive_utc();

        match kind {
            RelationKind::Block => {
                let row = NewBlockEdge {
                    blocker: actor.to_string(),
                    blocked: target.to_string(),
                    created_at: now,
                };
                diesel::insert_into(block_edges::table)
                    .values(&row)
                    .on_conflict((block_edges::blocker, block_edges::blocked))
                    .do_nothing()
                    .execute(&mut conn)
                    .await
                    .map_err(map_diesel_error)?;
            }
            RelationKind::Mute => {
                let row = NewMuteEdge {
                    muter: actor.to_string(),
                    muted: target.to_string(),
                    mute_stories: attrs.mute.mute_stories,
                    mute_posts: attrs.mute.mute_posts,
                    created_at: now,
                };
                diesel::insert_into(mute_edges::table)
                    .values(&row)
                    .on_conflict((mute_edges::muter, mute_edges::muted))
                    .do_update()
                    .set((
                        mute_edges::mute_stories.eq(attrs.mute.mute_stories),
                        mute_edges::mute_posts.eq(attrs.mute.mute_posts),
                    ))
                    .execute(&mut conn)
                    .await
                    .map_err(map_diesel_error)?;
            }
            RelationKind::Restrict => {
                let row = NewRestrictEdge {
                    restrictor: actor.to_string(),
                    restricted: target.to_string(),
                    created_at: now,
                };
                diesel::insert_into(restrict_edges::table)
                    .values(&row)
                    .on_conflict((restrict_edges::restrictor, restrict_edges::restricted))
                    .do_nothing()
                    .execute(&mut conn)
                    .await
                    .map_err(map_diesel_error)?;
            }
        }

        debug!("put {} edge {} -> {}", kind.as_str(), actor, target);
        let seq = self.feed.next_seq();
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
        let mut conn = self.conn().await?;

        let deleted = match kind {
            RelationKind::Block => diesel::delete(
                block_edges::table
                    .filter(block_edges::blocker.eq(actor.as_str()))
                    .filter(block_edges::blocked.eq(target.as_str())),
            )
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?,
            RelationKind::Mute => diesel::delete(
                mute_edges::table
                    .filter(mute_edges::muter.eq(actor.as_str()))
                    .filter(mute_edges::muted.eq(target.as_str())),
            )
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?,
            RelationKind::Restrict => diesel::delete(
                restrict_edges::table
                    .filter(restrict_edges::restrictor.eq(actor.as_str()))
                    .filter(restrict_edges::restricted.eq(target.as_str())),
            )
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?,
        };

        // Zero rows deleted means a no-op removal, still success
        if deleted > 0 {
            debug!("removed {} edge {} -> {}", kind.as_str(), actor, target);
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
        let mut conn = self.conn().await?;

        let edges = match kind {
            RelationKind::Block => block_edges::table
                .filter(block_edges::blocker.eq(actor.as_str()))
                .select((block_edges::blocked, block_edges::created_at))
                .load::<(String, NaiveDateTime)>(&mut conn)
                .await
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(target, created_at)| OutgoingEdge {
                    target: UserId::new(target),
                    attrs: RelationAttrs::default(),
                    created_at,
                })
                .collect(),
            RelationKind::Mute => mute_edges::table
                .filter(mute_edges::muter.eq(actor.as_str()))
                .select(MuteEdge::as_select())
                .load::<MuteEdge>(&mut conn)
                .await
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|row| OutgoingEdge {
                    target: UserId::new(row.muted),
                    attrs: RelationAttrs {
                        mute: crate::models::relation::MuteFlags {
                            mute_stories: row.mute_stories,
                            mute_posts: row.mute_posts,
                        },
                    },
                    created_at: row.created_at,
                })
                .collect(),
            RelationKind::Restrict => restrict_edges::table
                .filter(restrict_edges::restrictor.eq(actor.as_str()))
                .select((restrict_edges::restricted, restrict_edges::created_at))
                .load::<(String, NaiveDateTime)>(&mut conn)
                .await
                .map_err(map_diesel_error)?
                .into_iter()
                .map(|(target, created_at)| OutgoingEdge {
                    target: UserId::new(target),
                    attrs: RelationAttrs::default(),
                    created_at,
                })
                .collect(),
        };
        Ok(edges)
    }

    async fn exists(
        &self,
        kind: RelationKind,
        actor: &UserId,
        target: &UserId,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let count: i64 = match kind {
            RelationKind::Block => block_edges::table
                .filter(block_edges::blocker.eq(actor.as_str()))
                .filter(block_edges::blocked.eq(target.as_str()))
                .count()
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?,
            RelationKind::Mute => mute_edges::table
                .filter(mute_edges::muter.eq(actor.as_str()))
                .filter(mute_edges::muted.eq(target.as_str()))
                .count()
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?,
            RelationKind::Restrict => restrict_edges::table
                .filter(restrict_edges::restrictor.eq(actor.as_str()))
                .filter(restrict_edges::restricted.eq(target.as_str()))
                .count()
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?,
        };
        Ok(count > 0)
    }

    async fn latest_ban(&self, user: &UserId) -> Result<Option<BanRecord>, StoreError> {
        let mut conn = self.conn().await?;

        let row = ban_records::table
            .filter(ban_records::user_id.eq(user.as_str()))
            .order(ban_records::created_at.desc())
            .select(BanRow::as_select())
            .first::<BanRow>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        match row {
            Some(row) => row
                .into_record()
                .map(Some)
                .map_err(StoreError::Unavailable),
            None => Ok(None),
        }
    }

    async fn insert_ban(&self, record: BanRecord) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        let row = NewBanRow {
            user_id: record.user.to_string(),
            reason: record.reason.clone(),
            ban_type: record.ban_type.as_str().to_string(),
            expires_at: record.expires_at,
            created_at: record.created_at,
        };
        diesel::insert_into(ban_records::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let seq = self.feed.next_seq();
        self.feed.publish(StoreChange::BanUpserted { record, seq });
        Ok(())
    }

    async fn read_presence(&self, user: &UserId) -> Result<Option<PresenceRecord>, StoreError> {
        let mut conn = self.conn().await?;

        let row = presence_records::table
            .find(user.as_str())
            .select(PresenceRow::as_select())
            .first::<PresenceRow>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(PresenceRow::into_record))
    }

    async fn write_presence(
        &self,
        user: &UserId,
        is_online: bool,
        last_seen: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        // seq is bumped inside the upsert so write order is assigned by the
        // database, not by whichever client clock happens to be ahead
        let row = NewPresenceRow {
            user_id: user.to_string(),
            is_online,
            last_seen,
            seq: 1,
        };
        let stored = diesel::insert_into(presence_records::table)
            .values(&row)
            .on_conflict(presence_records::user_id)
            .do_update()
            .set((
                presence_records::is_online.eq(is_online),
                presence_records::last_seen.eq(last_seen),
                presence_records::seq.eq(presence_records::seq + 1i64),
            ))
            .returning(PresenceRow::as_select())
            .get_result::<PresenceRow>(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        self.feed.publish(StoreChange::PresenceUpdated {
            record: stored.into_record(),
        });
        Ok(())
    }

    fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        self.feed.subscribe(filter)
    }
}
