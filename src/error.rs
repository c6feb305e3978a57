// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure classes a relation store can report. The gatekeeper treats
/// these by class, never by message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or transiently failing; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Caller is not allowed to perform the operation; never retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Write collided with an existing row the operation would have created.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Row the operation expected is not there.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Conflict and NotFound mean the store already holds the state the
    /// mutation was establishing; idempotent callers absorb them as success.
    pub fn is_idempotent_success(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("connection refused".to_string()).is_retryable());
        assert!(!StoreError::Unauthorized("revoked".to_string()).is_retryable());
        assert!(!StoreError::Conflict("duplicate edge".to_string()).is_retryable());
        assert!(!StoreError::NotFound("no such edge".to_string()).is_retryable());
    }

    #[test]
    fn conflict_and_not_found_absorb_as_success() {
        assert!(StoreError::Conflict("duplicate edge".to_string()).is_idempotent_success());
        assert!(StoreError::NotFound("no such edge".to_string()).is_idempotent_success());
        assert!(!StoreError::Unavailable("down".to_string()).is_idempotent_success());
        assert!(!StoreError::Unauthorized("revoked".to_string()).is_idempotent_success());
    }
}
