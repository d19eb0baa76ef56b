// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server availability monitor.
//!
//! Caches the result of a health probe for a short freshness window. Request
//! outcomes feed back into the cache: a success marks the server available,
//! a transport failure marks it unavailable and schedules a forced re-check.

use crate::config::Config;
use crate::models::AvailabilityState;
use crate::transport::{HttpRequest, Transport};
use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Tracks whether the backing API is reachable.
pub struct AvailabilityMonitor {
    transport: Arc<dyn Transport>,
    health_url: String,
    probe_timeout: Duration,
    ttl: Duration,
    recheck_delay: Duration,
    state: RwLock<AvailabilityState>,
    probe_lock: Mutex<()>,
    recheck_pending: AtomicBool,
}

impl AvailabilityMonitor {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            health_url: config.url(&config.health_path),
            probe_timeout: config.probe_timeout,
            ttl: config.availability_ttl,
            recheck_delay: config.recheck_delay,
            state: RwLock::new(AvailabilityState::default()),
            probe_lock: Mutex::new(()),
            recheck_pending: AtomicBool::new(false),
        }
    }

    /// Current cached state, without probing.
    pub async fn state(&self) -> AvailabilityState {
        *self.state.read().await
    }

    /// Whether the server is available.
    ///
    /// Returns the cached value while it is fresh; `force` always probes.
    pub async fn check(&self, force: bool) -> bool {
        if !force {
            if let Some(available) = self.fresh_value().await {
                return available;
            }
        }

        let _guard = self.probe_lock.lock().await;

        // Another task may have probed while we waited for the lock.
        if !force {
            if let Some(available) = self.fresh_value().await {
                return available;
            }
        }

        let available = self.probe().await;
        self.set(available).await;
        available
    }

    /// Record a successful API call.
    pub async fn mark_available(&self) {
        let previous = self.state.read().await.available;
        self.set(true).await;
        if previous == Some(false) {
            tracing::info!("Server reachable again");
        }
    }

    /// Record a transport-level failure and schedule a forced re-check.
    pub async fn report_transport_failure(self: &Arc<Self>) {
        self.set(false).await;

        if self.recheck_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::warn!(
            recheck_in_ms = self.recheck_delay.as_millis() as u64,
            "Server unreachable, scheduling re-check"
        );

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(monitor.recheck_delay).await;
            monitor.recheck_pending.store(false, Ordering::Release);
            monitor.check(true).await;
        });
    }

    /// Start the repeating background probe.
    ///
    /// The loop stops when the returned handle is dropped.
    pub fn spawn_background_probe(self: &Arc<Self>, interval: Duration) -> BackgroundProbe {
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let available = monitor.check(true).await;
                tracing::debug!(available, "Background availability probe");
            }
        });
        BackgroundProbe { handle }
    }

    async fn fresh_value(&self) -> Option<bool> {
        let state = self.state.read().await;
        match (state.available, state.last_checked_at) {
            (Some(available), Some(at)) if at.elapsed() < self.ttl => Some(available),
            _ => None,
        }
    }

    async fn set(&self, available: bool) {
        let mut state = self.state.write().await;
        if state.available != Some(available) {
            tracing::info!(available, "Availability changed");
        }
        *state = AvailabilityState {
            available: Some(available),
            last_checked_at: Some(Instant::now()),
        };
    }

    async fn probe(&self) -> bool {
        let request = HttpRequest::new(Method::GET, &self.health_url).timeout(self.probe_timeout);

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                tracing::warn!(status = response.status, "Health probe returned non-success");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Handle to the background probe loop. Aborts the loop on drop.
pub struct BackgroundProbe {
    handle: JoinHandle<()>,
}

impl BackgroundProbe {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for BackgroundProbe {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
