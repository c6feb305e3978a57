// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::user::UserId;
use crate::schema::presence_records;

/// A user's live presence. Exactly one record per user; overwritten by the
/// owning client's heartbeat and by the server-side disconnect fallback.
/// `seq` is the server-assigned write order, used instead of wall-clock
/// timestamps so readers are immune to client clock skew.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: UserId,
    pub is_online: bool,
    pub last_seen: NaiveDateTime,
    pub seq: i64,
}

/// Presence row as stored
#[derive(Debug, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = presence_records)]
pub struct PresenceRow {
    pub user_id: String,
    pub is_online: bool,
    pub last_seen: NaiveDateTime,
    pub seq: i64,
}

impl PresenceRow {
    pub fn into_record(self) -> PresenceRecord {
        PresenceRecord {
            user: UserId::new(self.user_id),
            is_online: self.is_online,
            last_seen: self.last_seen,
            seq: self.seq,
        }
    }
}

/// DTO for upserting a presence row
#[derive(Debug, Insertable, Serialize, Deserialize)]
#[diesel(table_name = presence_records)]
pub struct NewPresenceRow {
    pub user_id: String,
    pub is_online: bool,
    pub last_seen: NaiveDateTime,
    pub seq: i64,
}
