// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the session client.

pub mod session;
pub mod user;

pub use session::{AvailabilityState, LoginAttemptState, Session};
pub use user::UserRecord;
