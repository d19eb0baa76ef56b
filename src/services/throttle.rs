// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login attempt throttling with exponential backoff.
//!
//! State is persisted after every change so a restart does not reset the
//! backoff. The failure counter only resets on a successful login.

use crate::db::SessionStore;
use crate::models::LoginAttemptState;
use crate::time_utils;
use std::time::Duration;
use tokio::sync::Mutex;

/// Failures tolerated before backoff starts.
const FREE_FAILURES: u32 = 3;
const BACKOFF_BASE_MS: i64 = 1000;
const BACKOFF_CAP_MS: i64 = 30_000;

/// Outcome of the pre-attempt gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allow,
    Throttled { retry_after: Duration },
}

/// Decide whether an attempt at `now_ms` may proceed.
pub fn evaluate(state: &LoginAttemptState, now_ms: i64, min_interval_ms: i64) -> ThrottleDecision {
    if let Some(until) = state.backoff_until.filter(|until| *until > now_ms) {
        return throttled(until - now_ms);
    }

    if let Some(last) = state.last_attempt_at {
        let elapsed = now_ms - last;
        if elapsed < min_interval_ms {
            return throttled(min_interval_ms - elapsed);
        }
    }

    ThrottleDecision::Allow
}

/// Backoff after `failure_count` consecutive failures, if any.
pub fn backoff_for(failure_count: u32) -> Option<i64> {
    if failure_count <= FREE_FAILURES {
        return None;
    }
    // Past 2^15 the cap applies anyway; clamp to keep the shift in range.
    let exponent = (failure_count - FREE_FAILURES).min(15);
    Some((BACKOFF_BASE_MS << exponent).min(BACKOFF_CAP_MS))
}

/// Apply a failed attempt at `now_ms`.
pub fn record_failure(state: &mut LoginAttemptState, now_ms: i64) {
    state.failure_count = state.failure_count.saturating_add(1);
    if let Some(backoff) = backoff_for(state.failure_count) {
        state.backoff_until = Some(now_ms + backoff);
    }
}

/// Apply a successful attempt.
pub fn record_success(state: &mut LoginAttemptState) {
    state.failure_count = 0;
    state.backoff_until = None;
}

fn throttled(remaining_ms: i64) -> ThrottleDecision {
    ThrottleDecision::Throttled {
        retry_after: Duration::from_millis(remaining_ms.max(0) as u64),
    }
}

/// Persistent login gate.
pub struct LoginThrottle {
    store: SessionStore,
    min_interval_ms: i64,
    lock: Mutex<()>,
}

impl LoginThrottle {
    pub fn new(store: SessionStore, min_interval: Duration) -> Self {
        Self {
            store,
            min_interval_ms: min_interval.as_millis() as i64,
            lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> LoginAttemptState {
        self.store.load_attempts().await
    }

    pub async fn before_attempt(&self) -> ThrottleDecision {
        self.before_attempt_at(time_utils::now_millis()).await
    }

    /// Gate an attempt at `now_ms`; an allowed attempt is recorded.
    pub async fn before_attempt_at(&self, now_ms: i64) -> ThrottleDecision {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load_attempts().await;

        let decision = evaluate(&state, now_ms, self.min_interval_ms);
        match decision {
            ThrottleDecision::Allow => {
                state.last_attempt_at = Some(now_ms);
                self.persist(&state).await;
            }
            ThrottleDecision::Throttled { retry_after } => {
                tracing::warn!(
                    retry_after_ms = retry_after.as_millis() as u64,
                    failures = state.failure_count,
                    "Login attempt throttled"
                );
            }
        }
        decision
    }

    pub async fn on_failure(&self) {
        self.on_failure_at(time_utils::now_millis()).await
    }

    pub async fn on_failure_at(&self, now_ms: i64) {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load_attempts().await;
        record_failure(&mut state, now_ms);
        if let Some(until) = state.backoff_until.filter(|until| *until > now_ms) {
            tracing::info!(
                failures = state.failure_count,
                backoff_until = %time_utils::format_millis(until),
                "Login backoff engaged"
            );
        }
        self.persist(&state).await;
    }

    pub async fn on_success(&self) {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load_attempts().await;
        record_success(&mut state);
        self.persist(&state).await;
    }

    async fn persist(&self, state: &LoginAttemptState) {
        if let Err(e) = self.store.save_attempts(state).await {
            tracing::warn!(error = %e, "Failed to persist login attempt state");
        }
    }
}
