// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted session store with typed operations.
//!
//! Provides high-level operations for:
//! - Session (token + user record)
//! - Login attempt state (throttling survives restarts)
//! - Remembered login identifier

use super::backend::{FileStore, KeyValueStore, MemoryStore, StoreOp};
use super::keys;
use crate::error::SessionError;
use crate::models::{LoginAttemptState, Session, UserRecord};
use crate::token;
use std::path::PathBuf;
use std::sync::Arc;

/// Typed view over the key/value backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Store backed by a JSON file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(path)))
    }

    /// Store backed by process memory (testing or ephemeral clients).
    pub fn new_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // ─── Session ─────────────────────────────────────────────────

    /// Load the persisted session. Never fails.
    ///
    /// Unreadable or inconsistent data clears the stored session and yields
    /// an empty one.
    pub async fn load(&self) -> Session {
        match self.try_load().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Persisted session unreadable, clearing");
                if let Err(e) = self.clear().await {
                    tracing::error!(error = %e, "Failed to clear corrupt session");
                }
                Session::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Session, SessionError> {
        let raw_token = self.backend.get(keys::TOKEN).await?;
        let raw_user = self.backend.get(keys::USER).await?;

        let token = match raw_token {
            Some(raw) => Some(token::sanitize(&raw).ok_or(SessionError::MalformedToken)?),
            None => None,
        };

        let user = match raw_user {
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| SessionError::Storage(format!("Corrupt user record: {}", e)))?;
                Some(UserRecord::from_value(value).ok_or_else(|| {
                    SessionError::Storage("User record is not an object".to_string())
                })?)
            }
            None => None,
        };

        Ok(Session {
            is_authenticated: token.is_some(),
            user,
            token,
        })
    }

    /// Persist a session. Absent fields are removed from storage.
    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut ops = Vec::with_capacity(2);

        match session.token.as_deref().and_then(token::sanitize) {
            Some(t) => ops.push(StoreOp::Set(keys::TOKEN, t)),
            None => ops.push(StoreOp::Remove(keys::TOKEN)),
        }

        match &session.user {
            Some(user) => {
                let json = serde_json::to_string(user)
                    .map_err(|e| SessionError::Internal(anyhow::anyhow!(e)))?;
                ops.push(StoreOp::Set(keys::USER, json));
            }
            None => ops.push(StoreOp::Remove(keys::USER)),
        }

        self.backend.apply(ops).await
    }

    /// Remove the stored token and user record.
    ///
    /// Throttle state and the remembered identifier are kept.
    pub async fn clear(&self) -> Result<(), SessionError> {
        self.backend
            .apply(vec![StoreOp::Remove(keys::TOKEN), StoreOp::Remove(keys::USER)])
            .await
    }

    // ─── Login Attempts ──────────────────────────────────────────

    /// Load throttle state. Unparseable values read as zero.
    pub async fn load_attempts(&self) -> LoginAttemptState {
        LoginAttemptState {
            last_attempt_at: self.get_i64(keys::LAST_LOGIN_ATTEMPT).await,
            failure_count: self
                .get_i64(keys::LOGIN_FAILURE_COUNT)
                .await
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0),
            backoff_until: self.get_i64(keys::LOGIN_BACKOFF_UNTIL).await,
        }
    }

    pub async fn save_attempts(&self, state: &LoginAttemptState) -> Result<(), SessionError> {
        let optional = |key: &'static str, value: Option<i64>| match value {
            Some(v) => StoreOp::Set(key, v.to_string()),
            None => StoreOp::Remove(key),
        };

        self.backend
            .apply(vec![
                optional(keys::LAST_LOGIN_ATTEMPT, state.last_attempt_at),
                StoreOp::Set(keys::LOGIN_FAILURE_COUNT, state.failure_count.to_string()),
                optional(keys::LOGIN_BACKOFF_UNTIL, state.backoff_until),
            ])
            .await
    }

    async fn get_i64(&self, key: &str) -> Option<i64> {
        match self.backend.get(key).await {
            Ok(value) => value.and_then(|v| v.trim().parse().ok()),
            Err(e) => {
                tracing::warn!(error = %e, key, "Failed to read throttle state");
                None
            }
        }
    }

    // ─── Remembered Identifier ───────────────────────────────────

    pub async fn remembered_identifier(&self) -> Option<String> {
        self.backend
            .get(keys::REMEMBERED_IDENTIFIER)
            .await
            .ok()
            .flatten()
            .filter(|v| !v.is_empty())
    }

    pub async fn set_remembered_identifier(&self, identifier: &str) -> Result<(), SessionError> {
        self.backend
            .apply(vec![StoreOp::Set(
                keys::REMEMBERED_IDENTIFIER,
                identifier.to_string(),
            )])
            .await
    }

    pub async fn forget_identifier(&self) -> Result<(), SessionError> {
        self.backend
            .apply(vec![StoreOp::Remove(keys::REMEMBERED_IDENTIFIER)])
            .await
    }
}
