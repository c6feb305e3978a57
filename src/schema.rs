// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

// Import diesel table macros
use diesel::allow_tables_to_appear_in_same_query;
use diesel::table;

// Directed block edges; at most one row per ordered (blocker, blocked) pair
table! {
    block_edges (id) {
        id -> Int4,
        blocker -> Varchar,
        blocked -> Varchar,
        created_at -> Timestamp,
    }
}

// Directed mute edges with independent per-surface flags
table! {
    mute_edges (id) {
        id -> Int4,
        muter -> Varchar,
        muted -> Varchar,
        mute_stories -> Bool,
        mute_posts -> Bool,
        created_at -> Timestamp,
    }
}

// Directed restrict edges; never readable by the restricted party
table! {
    restrict_edges (id) {
        id -> Int4,
        restrictor -> Varchar,
        restricted -> Varchar,
        created_at -> Timestamp,
    }
}

// Append-only ban history; the newest row per user is authoritative
table! {
    ban_records (id) {
        id -> Int4,
        user_id -> Varchar,
        reason -> Text,
        ban_type -> Varchar,
        expires_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

// One row per user, last write wins by server-assigned seq
table! {
    presence_records (user_id) {
        user_id -> Varchar,
        is_online -> Bool,
        last_seen -> Timestamp,
        seq -> Int8,
    }
}

// Allow joining the tables if needed
allow_tables_to_appear_in_same_query!(
    block_edges,
    mute_edges,
    restrict_edges,
    ban_records,
    presence_records,
);
