// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Session, login-attempt and availability state.

use super::UserRecord;
use serde::{Deserialize, Serialize};

/// Authenticated state of the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Current user, if signed in
    pub user: Option<UserRecord>,
    /// Current bearer token, normalized (no scheme prefix)
    pub token: Option<String>,
    /// Whether the session is signed in
    pub is_authenticated: bool,
}

impl Session {
    /// A signed-in session.
    pub fn authenticated(user: Option<UserRecord>, token: String) -> Self {
        Self {
            user,
            token: Some(token),
            is_authenticated: true,
        }
    }
}

/// Persisted login throttling state. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptState {
    pub last_attempt_at: Option<i64>,
    pub failure_count: u32,
    pub backoff_until: Option<i64>,
}

/// Cached result of the server health probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityState {
    /// `None` until the first probe completes
    pub available: Option<bool>,
    /// When the value was last set (tokio clock)
    pub last_checked_at: Option<tokio::time::Instant>,
}
