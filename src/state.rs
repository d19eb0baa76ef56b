// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Owned in-memory session, kept in step with the persisted store.
//!
//! Every writer serializes on `write_lock`, persists first, then swaps the
//! whole `Session` in one assignment so readers never see a partial value.
//! The epoch counter increments whenever a session ends or a new one starts;
//! work started under an older epoch (e.g. a slow refresh) must not write.

use crate::db::SessionStore;
use crate::error::SessionError;
use crate::models::{Session, UserRecord};
use crate::token;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

pub struct SessionState {
    store: SessionStore,
    current: RwLock<Session>,
    write_lock: Mutex<()>,
    epoch: AtomicU64,
}

impl SessionState {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            current: RwLock::new(Session::default()),
            write_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.current.read().await.clone()
    }

    /// Current token, if the session is signed in.
    pub async fn token(&self) -> Option<String> {
        let current = self.current.read().await;
        current
            .token
            .as_ref()
            .filter(|_| current.is_authenticated)
            .cloned()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_authenticated
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Replace the in-memory session with whatever the store holds.
    pub async fn reload(&self) -> Session {
        let _guard = self.write_lock.lock().await;
        let session = self.store.load().await;
        *self.current.write().await = session.clone();
        session
    }

    /// Install a freshly authenticated session (login or register).
    ///
    /// Returns the epoch the new session lives under.
    pub async fn install(&self, mut session: Session) -> Result<u64, SessionError> {
        if let Some(raw) = session.token.take() {
            session.token = Some(token::sanitize(&raw).ok_or(SessionError::MalformedToken)?);
        }

        let _guard = self.write_lock.lock().await;
        self.store.save(&session).await?;
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self.current.write().await = session;
        Ok(epoch)
    }

    /// Swap in a refreshed token.
    ///
    /// Returns `false` without writing if the session ended or was replaced
    /// since `expected_epoch`.
    pub async fn install_token(
        &self,
        new_token: &str,
        expected_epoch: u64,
    ) -> Result<bool, SessionError> {
        let new_token = token::sanitize(new_token).ok_or(SessionError::MalformedToken)?;

        let _guard = self.write_lock.lock().await;
        if self.epoch() != expected_epoch || !self.current.read().await.is_authenticated {
            return Ok(false);
        }

        // The store is authoritative for everything but the token.
        let persisted = self.store.load().await;
        let user = match persisted.user {
            Some(user) => Some(user),
            None => self.current.read().await.user.clone(),
        };
        let session = Session::authenticated(user, new_token);

        self.store.save(&session).await?;
        *self.current.write().await = session;
        Ok(true)
    }

    /// Merge a partial user record into the current session.
    ///
    /// Returns the merged record, or `None` if there is no signed-in session.
    pub async fn merge_user(
        &self,
        partial: &UserRecord,
    ) -> Result<Option<UserRecord>, SessionError> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.read().await.clone();
        if !current.is_authenticated {
            return Ok(None);
        }

        let persisted = self.store.load().await;
        let mut user = persisted.user.or(current.user).unwrap_or_default();
        user.merge(partial);

        let session = Session {
            user: Some(user.clone()),
            ..current
        };
        self.store.save(&session).await?;
        *self.current.write().await = session;
        Ok(Some(user))
    }

    /// End the session. Returns whether a signed-in session was ended.
    ///
    /// Always resets memory, even if the store cannot be cleared.
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        self.reset().await
    }

    /// End the session only if it is still the one started under `epoch`.
    pub async fn clear_if_current(&self, epoch: u64) -> bool {
        let _guard = self.write_lock.lock().await;
        if self.epoch() != epoch {
            return false;
        }
        self.reset().await
    }

    // Caller holds `write_lock`.
    async fn reset(&self) -> bool {
        self.epoch.fetch_add(1, Ordering::AcqRel);

        if let Err(e) = self.store.clear().await {
            tracing::error!(error = %e, "Failed to clear persisted session");
        }

        let mut current = self.current.write().await;
        let was_authenticated = current.is_authenticated;
        *current = Session::default();
        was_authenticated
    }
}
