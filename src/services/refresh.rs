// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token refresh coordination.
//!
//! Handles:
//! - Single-flight refresh: concurrent callers share one network call
//! - Proactive refresh timer armed ahead of token expiry
//! - Forced logout when a refresh fails
//!
//! The first caller registers the subscriber queue and spawns the refresh
//! task; later callers append to the queue. The task drains the queue in
//! registration order once the call settles, so every caller observes the
//! same outcome. Running the call in its own task means a dropped caller
//! never strands the others.

use crate::config::Config;
use crate::error::SessionError;
use crate::services::availability::AvailabilityMonitor;
use crate::services::observer::Observers;
use crate::state::SessionState;
use crate::time_utils;
use crate::token::{self, Claims};
use crate::transport::{HttpRequest, Transport};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Maximum lead time before expiry at which the proactive refresh fires (5 minutes).
const REFRESH_LEAD_MS: i64 = 5 * 60 * 1000;

/// Result delivered to every subscriber of one refresh.
pub type RefreshOutcome = Result<String, RefreshFailure>;

/// Why a refresh did not produce a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no token to refresh")]
    NoToken,

    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    #[error("refresh response did not contain a usable token")]
    MissingToken,

    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("session ended while refreshing")]
    SessionEnded,

    #[error("failed to persist refreshed token: {0}")]
    Storage(String),

    #[error("refresh task dropped")]
    Abandoned,
}

impl From<RefreshFailure> for SessionError {
    fn from(failure: RefreshFailure) -> Self {
        SessionError::RefreshFailed(failure.to_string())
    }
}

/// Marks a request that has already spent its one refresh-and-retry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryMark {
    retried: bool,
}

impl RetryMark {
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    token: Option<String>,
}

struct ArmedTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Coordinates token refreshes for one session.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    refresh_url: String,
    timeout: Duration,
    session: Arc<SessionState>,
    monitor: Arc<AvailabilityMonitor>,
    observers: Observers,
    /// `Some` exactly while a refresh call is outstanding.
    subscribers: Mutex<Option<Vec<oneshot::Sender<RefreshOutcome>>>>,
    timer: Mutex<Option<ArmedTimer>>,
    timer_seq: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        session: Arc<SessionState>,
        monitor: Arc<AvailabilityMonitor>,
        observers: Observers,
    ) -> Self {
        Self {
            transport,
            refresh_url: config.url(&config.refresh_path),
            timeout: config.http_timeout,
            session,
            monitor,
            observers,
            subscribers: Mutex::new(None),
            timer: Mutex::new(None),
            timer_seq: AtomicU64::new(0),
        }
    }

    // ─── Single-flight Refresh ───────────────────────────────────────────────

    /// Refresh the session token, joining any refresh already in flight.
    pub async fn refresh_now(self: &Arc<Self>) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut queue = lock(&self.subscribers);
            match queue.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    *queue = Some(vec![tx]);
                    true
                }
            }
        };

        if leader {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.run_refresh().await });
        } else {
            tracing::debug!("Refresh already in flight, waiting for its result");
        }

        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }

    /// Refresh after a request carrying `used_token` came back 401.
    ///
    /// Marks the request as retried. If the session already holds a different
    /// token (someone else refreshed meanwhile), that token is returned
    /// without another network call.
    pub async fn on_expired_during_request(
        self: &Arc<Self>,
        used_token: Option<&str>,
        mark: &mut RetryMark,
    ) -> RefreshOutcome {
        mark.retried = true;

        // Signed out meanwhile: nothing to refresh.
        let current = self.session.token().await.ok_or(RefreshFailure::SessionEnded)?;
        if used_token.is_some_and(|used| current != token::normalize(used)) {
            tracing::debug!("Token already replaced, retrying with current token");
            return Ok(current);
        }

        self.refresh_now().await
    }

    /// Whether a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.subscribers).is_some()
    }

    async fn run_refresh(self: Arc<Self>) {
        let epoch = self.session.epoch();
        tracing::info!("Refreshing session token");

        let outcome = self.perform_refresh(epoch).await;

        match &outcome {
            Ok(_) => tracing::info!("Session token refreshed"),
            Err(RefreshFailure::SessionEnded) => {
                tracing::info!("Refresh settled after session ended, result discarded");
            }
            Err(failure) => {
                tracing::warn!(error = %failure, "Token refresh failed, ending session");
                self.expire_session(epoch).await;
            }
        }

        // Notify under the lock so no new refresh can start until every
        // subscriber of this one has its outcome.
        let mut queue = lock(&self.subscribers);
        let waiters = queue.take().unwrap_or_default();
        tracing::debug!(subscribers = waiters.len(), "Notifying refresh subscribers");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        drop(queue);
    }

    async fn perform_refresh(self: &Arc<Self>, epoch: u64) -> RefreshOutcome {
        let current = self.session.token().await.ok_or(RefreshFailure::NoToken)?;

        let mut request = HttpRequest::new(Method::POST, &self.refresh_url)
            .json(serde_json::json!({ "token": current }))
            .timeout(self.timeout);
        if let Some(header) = token::bearer_header(&current)
            .and_then(|h| HeaderValue::from_str(&h).ok())
        {
            request.headers.insert(AUTHORIZATION, header);
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.monitor.report_transport_failure().await;
                return Err(RefreshFailure::Network(e.to_string()));
            }
        };

        if !response.is_success() {
            return Err(RefreshFailure::Rejected(response.status));
        }

        let new_token = serde_json::from_value::<RefreshResponse>(response.body)
            .ok()
            .and_then(|body| body.token)
            .and_then(|t| token::sanitize(&t))
            .ok_or(RefreshFailure::MissingToken)?;

        match self.session.install_token(&new_token, epoch).await {
            Ok(true) => {}
            Ok(false) => return Err(RefreshFailure::SessionEnded),
            Err(e) => return Err(RefreshFailure::Storage(e.to_string())),
        }

        self.monitor.mark_available().await;
        self.observers.token_installed(&new_token);
        self.schedule_proactive_refresh(&new_token);

        Ok(new_token)
    }

    /// End the session started under `epoch`, once.
    pub async fn expire_session(&self, epoch: u64) {
        self.cancel_timer();
        if self.session.clear_if_current(epoch).await {
            tracing::warn!("Session expired, signed out");
            self.observers.session_ended();
        }
    }

    // ─── Proactive Timer ─────────────────────────────────────────────────────

    /// Arm the proactive refresh timer for `token`, replacing any armed timer.
    ///
    /// Tokens without `exp` never expire, so no timer is armed for them.
    pub fn schedule_proactive_refresh(self: &Arc<Self>, token: &str) {
        self.cancel_timer();

        let claims = match token::decode(token) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::warn!("Cannot schedule refresh for malformed token");
                return;
            }
        };

        let now_ms = time_utils::now_millis();
        let Some(delay) = refresh_delay(&claims, now_ms) else {
            tracing::debug!("Token has no expiry, proactive refresh not scheduled");
            return;
        };

        let id = self.timer_seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            expires_at = %claims.expires_at_millis().map(time_utils::format_millis).unwrap_or_default(),
            "Proactive refresh scheduled"
        );

        let coordinator = Arc::clone(self);
        // Hold the slot while spawning so a zero-delay timer finds itself armed.
        let mut slot = lock(&self.timer);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Detach from the slot so re-arming after this refresh does not abort us.
            {
                let mut slot = lock(&coordinator.timer);
                if slot.as_ref().map(|armed| armed.id) != Some(id) {
                    return;
                }
                slot.take();
            }

            tracing::info!("Proactive refresh timer fired");
            let _ = coordinator.refresh_now().await;
        });

        if let Some(previous) = slot.replace(ArmedTimer { id, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel the armed proactive timer, if any.
    pub fn cancel_timer(&self) {
        if let Some(armed) = lock(&self.timer).take() {
            armed.handle.abort();
            tracing::debug!("Proactive refresh timer cancelled");
        }
    }

    /// Whether a proactive timer is armed.
    pub fn has_timer(&self) -> bool {
        lock(&self.timer).is_some()
    }
}

/// Delay until the proactive refresh should fire.
///
/// `refresh = until_expiry - min(5 min, lifetime / 2)`, floored at zero.
/// Lifetime is `exp - iat`, or the remaining time when `iat` is absent.
/// `None` when the token does not expire.
pub fn refresh_delay(claims: &Claims, now_ms: i64) -> Option<Duration> {
    let exp_ms = claims.expires_at_millis()?;
    // Claims are untrusted; extreme values saturate instead of overflowing.
    let until_expiry = exp_ms.saturating_sub(now_ms);
    let lifetime = match claims.iat {
        Some(iat) => exp_ms.saturating_sub(iat.saturating_mul(1000)),
        None => until_expiry,
    };

    let lead = REFRESH_LEAD_MS.min(lifetime / 2).max(0);
    let refresh_in = until_expiry.saturating_sub(lead);

    Some(Duration::from_millis(refresh_in.max(0) as u64))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_S: i64 = 1_700_000_000;
    const NOW_MS: i64 = NOW_S * 1000;

    #[test]
    fn one_hour_token_refreshes_five_minutes_early() {
        let claims = Claims {
            exp: Some(NOW_S + 3600),
            iat: Some(NOW_S),
        };
        assert_eq!(
            refresh_delay(&claims, NOW_MS),
            Some(Duration::from_millis(3_300_000))
        );
    }

    #[test]
    fn short_token_refreshes_at_half_life() {
        let claims = Claims {
            exp: Some(NOW_S + 120),
            iat: Some(NOW_S),
        };
        assert_eq!(
            refresh_delay(&claims, NOW_MS),
            Some(Duration::from_millis(60_000))
        );
    }

    #[test]
    fn expired_or_imminent_token_refreshes_immediately() {
        let expired = Claims {
            exp: Some(NOW_S - 10),
            iat: Some(NOW_S - 3610),
        };
        assert_eq!(refresh_delay(&expired, NOW_MS), Some(Duration::ZERO));

        let imminent = Claims {
            exp: Some(NOW_S + 60),
            iat: Some(NOW_S - 3540),
        };
        assert_eq!(refresh_delay(&imminent, NOW_MS), Some(Duration::ZERO));
    }

    #[test]
    fn no_exp_means_no_timer() {
        let claims = Claims {
            exp: None,
            iat: Some(NOW_S),
        };
        assert_eq!(refresh_delay(&claims, NOW_MS), None);
    }

    #[test]
    fn extreme_claims_do_not_overflow() {
        let wide = Claims {
            exp: Some(i64::MAX / 1000),
            iat: Some(i64::MIN / 1000),
        };
        assert!(refresh_delay(&wide, NOW_MS).is_some());

        let far_past = Claims {
            exp: Some(i64::MIN),
            iat: Some(i64::MAX),
        };
        assert_eq!(refresh_delay(&far_past, NOW_MS), Some(Duration::ZERO));
    }

    #[test]
    fn decoded_huge_negative_exp_refreshes_immediately() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":-1e300}"#);
        let claims = token::decode(&format!("h.{payload}.s")).unwrap();
        assert_eq!(claims.exp, Some(i64::MIN));
        assert_eq!(refresh_delay(&claims, NOW_MS), Some(Duration::ZERO));
    }

    #[test]
    fn missing_iat_uses_remaining_time() {
        let claims = Claims {
            exp: Some(NOW_S + 3600),
            iat: None,
        };
        assert_eq!(
            refresh_delay(&claims, NOW_MS),
            Some(Duration::from_millis(3_300_000))
        );
    }
}
