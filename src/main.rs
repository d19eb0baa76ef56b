// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session-Core daemon
//!
//! Restores the persisted session, keeps its token refreshed and watches
//! API availability until interrupted.

use session_core::{
    config::Config, db::SessionStore, services::SessionObserver, transport::HttpTransport,
    SessionClient,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs session changes in place of a realtime socket.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn reconnect_with_token(&self, _token: &str) {
        tracing::info!("Session token installed, reconnecting realtime channel");
    }

    fn session_ended(&self) {
        tracing::info!("Session ended, sign-in required");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        api = %config.api_base_url,
        store = %config.store_path.display(),
        "Starting session client"
    );

    let transport = Arc::new(HttpTransport::new(config.http_timeout)?);
    let store = SessionStore::file(&config.store_path);
    let client = SessionClient::new(config, transport, store);
    client.observers.register(Arc::new(LogObserver));

    let session = client.manager.restore().await;
    tracing::info!(authenticated = session.is_authenticated, "Session loaded");

    let available = client.monitor.check(true).await;
    tracing::info!(available, "Initial availability probe");
    client.start_background_probe();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    client.shutdown();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session_core=debug".parse().expect("static directive"))
                .add_directive("info".parse().expect("static directive")),
        )
        .with(format)
        .init();
}
