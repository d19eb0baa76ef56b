// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - session lifecycle and request handling.

pub mod availability;
pub mod endpoints;
pub mod observer;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod throttle;

pub use availability::{AvailabilityMonitor, BackgroundProbe};
pub use endpoints::{ApiRequest, AuthMode, EndpointCatalog, Idempotence, Operation};
pub use observer::{Observers, SessionObserver};
pub use pipeline::RequestPipeline;
pub use refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
pub use session::{LoginRequest, RegisterRequest, SessionManager};
pub use throttle::{LoginThrottle, ThrottleDecision};
