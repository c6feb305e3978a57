// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::user::UserId;
use crate::schema::{block_edges, mute_edges, restrict_edges};

/// The closed set of user-owned relation kinds. Adding a kind forces a
/// review of every decision site in the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Block,
    Mute,
    Restrict,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Block => "block",
            RelationKind::Mute => "mute",
            RelationKind::Restrict => "restrict",
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(RelationKind::Block),
            "mute" => Ok(RelationKind::Mute),
            "restrict" => Ok(RelationKind::Restrict),
            other => Err(format!("unknown relation kind: {}", other)),
        }
    }
}

/// Per-surface mute switches. The two flags are independent, not a sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteFlags {
    pub mute_stories: bool,
    pub mute_posts: bool,
}

impl MuteFlags {
    pub fn stories() -> Self {
        Self {
            mute_stories: true,
            mute_posts: false,
        }
    }

    pub fn posts() -> Self {
        Self {
            mute_stories: false,
            mute_posts: true,
        }
    }

    pub fn all() -> Self {
        Self {
            mute_stories: true,
            mute_posts: true,
        }
    }
}

/// Attributes carried by a `put`. Only mute edges have any; the struct is
/// ignored for block and restrict so `put` keeps a uniform shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAttrs {
    #[serde(default)]
    pub mute: MuteFlags,
}

impl From<MuteFlags> for RelationAttrs {
    fn from(mute: MuteFlags) -> Self {
        Self { mute }
    }
}

/// One outgoing edge as returned by `list_outgoing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEdge {
    pub target: UserId,
    pub attrs: RelationAttrs,
    pub created_at: NaiveDateTime,
}

/// Block edge row - one profile blocking another
#[derive(Debug, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = block_edges)]
pub struct BlockEdge {
    pub id: i32,
    pub blocker: String,
    pub blocked: String,
    pub created_at: NaiveDateTime,
}

/// DTO for inserting a new block edge
#[derive(Debug, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = block_edges)]
pub struct NewBlockEdge {
    pub blocker: String,
    pub blocked: String,
    pub created_at: NaiveDateTime,
}

/// Mute edge row with per-surface flags
#[derive(Debug, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = mute_edges)]
pub struct MuteEdge {
    pub id: i32,
    pub muter: String,
    pub muted: String,
    pub mute_stories: bool,
    pub mute_posts: bool,
    pub created_at: NaiveDateTime,
}

/// DTO for inserting or updating a mute edge
#[derive(Debug, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = mute_edges)]
pub struct NewMuteEdge {
    pub muter: String,
    pub muted: String,
    pub mute_stories: bool,
    pub mute_posts: bool,
    pub created_at: NaiveDateTime,
}

/// Restrict edge row
#[derive(Debug, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = restrict_edges)]
pub struct RestrictEdge {
    pub id: i32,
    pub restrictor: String,
    pub restricted: String,
    pub created_at: NaiveDateTime,
}

/// DTO for inserting a new restrict edge
#[derive(Debug, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = restrict_edges)]
pub struct NewRestrictEdge {
    pub restrictor: String,
    pub restricted: String,
    pub created_at: NaiveDateTime,
}
