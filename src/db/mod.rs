//! Persistence layer for the client session.

pub mod backend;
pub mod store;

pub use backend::{FileStore, KeyValueStore, MemoryStore, StoreOp};
pub use store::SessionStore;

/// Persisted key names as constants.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const REMEMBERED_IDENTIFIER: &str = "remembered_identifier";
    pub const LAST_LOGIN_ATTEMPT: &str = "last_login_attempt";
    pub const LOGIN_FAILURE_COUNT: &str = "login_failure_count";
    /// Epoch millis until which login attempts are rejected
    pub const LOGIN_BACKOFF_UNTIL: &str = "login_backoff_until";
}
