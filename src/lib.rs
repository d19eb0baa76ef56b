// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Session-Core: client-side session lifecycle and resilient API access
//!
//! This crate keeps a bearer-token session alive across restarts, refreshes
//! it ahead of expiry, and routes API calls through ordered endpoint
//! fallbacks with graceful degradation.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod time_utils;
pub mod token;
pub mod transport;

use config::Config;
use db::SessionStore;
use error::SessionError;
use serde_json::Value;
use services::{
    ApiRequest, AvailabilityMonitor, BackgroundProbe, EndpointCatalog, LoginThrottle, Observers,
    RefreshCoordinator, RequestPipeline, SessionManager,
};
use state::SessionState;
use std::sync::{Arc, Mutex, PoisonError};
use transport::Transport;

/// Shared client state: every component wired to one transport and store.
pub struct SessionClient {
    pub config: Config,
    pub session: Arc<SessionState>,
    pub monitor: Arc<AvailabilityMonitor>,
    pub refresh: Arc<RefreshCoordinator>,
    pub pipeline: Arc<RequestPipeline>,
    pub manager: SessionManager,
    pub observers: Observers,
    probe: Mutex<Option<BackgroundProbe>>,
}

impl SessionClient {
    pub fn new(config: Config, transport: Arc<dyn Transport>, store: SessionStore) -> Self {
        Self::with_catalog(config, transport, store, EndpointCatalog::default())
    }

    pub fn with_catalog(
        config: Config,
        transport: Arc<dyn Transport>,
        store: SessionStore,
        catalog: EndpointCatalog,
    ) -> Self {
        let observers = Observers::default();
        let session = Arc::new(SessionState::new(store.clone()));
        let monitor = Arc::new(AvailabilityMonitor::new(&config, transport.clone()));
        let refresh = Arc::new(RefreshCoordinator::new(
            &config,
            transport.clone(),
            session.clone(),
            monitor.clone(),
            observers.clone(),
        ));
        let pipeline = Arc::new(RequestPipeline::new(
            &config,
            transport,
            session.clone(),
            monitor.clone(),
            refresh.clone(),
            catalog,
        ));
        let manager = SessionManager::new(
            session.clone(),
            pipeline.clone(),
            refresh.clone(),
            monitor.clone(),
            LoginThrottle::new(store, config.login_min_interval),
            observers.clone(),
        );

        Self {
            config,
            session,
            monitor,
            refresh,
            pipeline,
            manager,
            observers,
            probe: Mutex::new(None),
        }
    }

    /// Start a catalog request.
    pub fn request(&self, operation: &str) -> Result<ApiRequest, SessionError> {
        self.pipeline.request(operation)
    }

    /// Run a request through the resilient pipeline.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, SessionError> {
        self.pipeline.execute(request).await
    }

    /// Start the periodic health probe, replacing any running one.
    pub fn start_background_probe(&self) {
        let probe = self
            .monitor
            .spawn_background_probe(self.config.probe_interval);
        let previous = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(probe);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Stop background work. The persisted session is left intact.
    pub fn shutdown(&self) {
        if let Some(probe) = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            probe.stop();
        }
        self.refresh.cancel_timer();
        tracing::info!("Session client stopped");
    }
}
