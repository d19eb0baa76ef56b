// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Downstream consumers of session changes (socket reconnects, UI redirects).

use std::sync::{Arc, PoisonError, RwLock};

/// Receives session lifecycle notifications.
pub trait SessionObserver: Send + Sync {
    /// A new token was installed (login, register or refresh).
    fn reconnect_with_token(&self, token: &str);

    /// The session ended (logout, expiry or failed refresh).
    fn session_ended(&self) {}
}

/// Registered observers, notified in registration order.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<RwLock<Vec<Arc<dyn SessionObserver>>>>,
}

impl Observers {
    pub fn register(&self, observer: Arc<dyn SessionObserver>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn token_installed(&self, token: &str) {
        for observer in self.snapshot() {
            observer.reconnect_with_token(token);
        }
    }

    pub fn session_ended(&self) {
        for observer in self.snapshot() {
            observer.session_ended();
        }
    }

    // Observers run outside the lock so they may register others.
    fn snapshot(&self) -> Vec<Arc<dyn SessionObserver>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
