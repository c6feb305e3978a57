// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::user::UserId;
use crate::schema::ban_records;

/// Kind of administrative suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanType {
    Temporary,
    Permanent,
}

impl BanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanType::Temporary => "temporary",
            BanType::Permanent => "permanent",
        }
    }
}

impl FromStr for BanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temporary" => Ok(BanType::Temporary),
            "permanent" => Ok(BanType::Permanent),
            other => Err(format!("unknown ban type: {}", other)),
        }
    }
}

/// One administrative ban. Rows are append-only; only the newest row per
/// user is authoritative, older rows are retained for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub user: UserId,
    pub reason: String,
    pub ban_type: BanType,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl BanRecord {
    /// Active iff permanent, or temporary with an expiry still in the
    /// future. An expired temporary row is inert.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        match self.ban_type {
            BanType::Permanent => true,
            BanType::Temporary => self.expires_at.map(|t| t > now).unwrap_or(false),
        }
    }
}

/// Ban row as stored
#[derive(Debug, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = ban_records)]
pub struct BanRow {
    pub id: i32,
    pub user_id: String,
    pub reason: String,
    pub ban_type: String,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl BanRow {
    pub fn into_record(self) -> Result<BanRecord, String> {
        Ok(BanRecord {
            user: UserId::new(self.user_id),
            reason: self.reason,
            ban_type: self.ban_type.parse()?,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

/// DTO for inserting a new ban row
#[derive(Debug, Insertable, Serialize, Deserialize)]
#[diesel(table_name = ban_records)]
pub struct NewBanRow {
    pub user_id: String,
    pub reason: String,
    pub ban_type: String,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(ban_type: BanType, expires_at: Option<NaiveDateTime>) -> BanRecord {
        BanRecord {
            user: UserId::new("u1"),
            reason: "tos".to_string(),
            ban_type,
            expires_at,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn permanent_ban_is_always_active() {
        let now = Utc::now().naive_utc();
        let rec = record(BanType::Permanent, None);
        assert!(rec.is_active(now));
        assert!(rec.is_active(now + Duration::days(365)));
    }

    #[test]
    fn temporary_ban_expires_at_boundary() {
        let now = Utc::now().naive_utc();
        let rec = record(BanType::Temporary, Some(now + Duration::hours(1)));
        assert!(rec.is_active(now));
        // Active strictly before expires_at, inert at and after it
        assert!(!rec.is_active(now + Duration::hours(1)));
        assert!(!rec.is_active(now + Duration::hours(2)));
    }

    #[test]
    fn temporary_ban_without_expiry_is_inert() {
        let now = Utc::now().naive_utc();
        assert!(!record(BanType::Temporary, None).is_active(now));
    }
}
