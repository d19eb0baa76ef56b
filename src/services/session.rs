// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session façade: the operations the rest of the application calls.
//!
//! Orchestration only. State lives in `SessionState`, the refresh timer in
//! `RefreshCoordinator`, and throttle counters in the store.

use crate::error::SessionError;
use crate::models::{Session, UserRecord};
use crate::services::availability::AvailabilityMonitor;
use crate::services::endpoints::{ops, ApiRequest, AuthMode};
use crate::services::observer::Observers;
use crate::services::pipeline::RequestPipeline;
use crate::services::refresh::RefreshCoordinator;
use crate::services::throttle::{LoginThrottle, ThrottleDecision};
use crate::state::SessionState;
use crate::time_utils;
use crate::token;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

/// Status reported for input rejected before dispatch.
const LOCAL_VALIDATION_STATUS: u16 = 400;

/// Login form.
#[derive(Debug, Clone, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Persist the email as the remembered login identifier
    pub remember: bool,
}

/// Registration form.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,

    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100, message = "Full name is too long"))]
    pub full_name: Option<String>,
}

/// Check the password composition rules not expressible as a length bound.
pub fn password_policy_violation(password: &str) -> Option<&'static str> {
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("Password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("Password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain a digit");
    }
    None
}

/// Orchestrates login, registration, logout and profile updates.
pub struct SessionManager {
    session: Arc<SessionState>,
    pipeline: Arc<RequestPipeline>,
    refresh: Arc<RefreshCoordinator>,
    monitor: Arc<AvailabilityMonitor>,
    throttle: LoginThrottle,
    observers: Observers,
}

impl SessionManager {
    pub fn new(
        session: Arc<SessionState>,
        pipeline: Arc<RequestPipeline>,
        refresh: Arc<RefreshCoordinator>,
        monitor: Arc<AvailabilityMonitor>,
        throttle: LoginThrottle,
        observers: Observers,
    ) -> Self {
        Self {
            session,
            pipeline,
            refresh,
            monitor,
            throttle,
            observers,
        }
    }

    /// Current session.
    pub async fn current(&self) -> Session {
        self.session.snapshot().await
    }

    pub fn throttle(&self) -> &LoginThrottle {
        &self.throttle
    }

    /// Login identifier saved by a "remember me" login. Survives logout.
    pub async fn remembered_identifier(&self) -> Option<String> {
        self.session.store().remembered_identifier().await
    }

    pub async fn forget_identifier(&self) -> Result<(), SessionError> {
        self.session.store().forget_identifier().await
    }

    // ─── Startup ─────────────────────────────────────────────────────────────

    /// Load the persisted session at startup.
    ///
    /// A valid token arms the proactive refresh; an expired one is discarded.
    pub async fn restore(&self) -> Session {
        let session = self.session.reload().await;

        let Some(current) = session.token.clone().filter(|_| session.is_authenticated) else {
            tracing::info!("No persisted session");
            return session;
        };

        if !token::is_valid(&current, time_utils::now_millis()) {
            tracing::info!("Persisted token expired, clearing session");
            self.session.clear().await;
            return Session::default();
        }

        self.refresh.schedule_proactive_refresh(&current);
        self.observers.token_installed(&current);
        tracing::info!(
            user_id = session.user.as_ref().and_then(UserRecord::id).as_deref(),
            "Session restored"
        );
        session
    }

    // ─── Login / Register ────────────────────────────────────────────────────

    pub async fn login(&self, request: LoginRequest) -> Result<Session, SessionError> {
        request.validate().map_err(validation_error)?;

        if let ThrottleDecision::Throttled { retry_after } = self.throttle.before_attempt().await {
            return Err(SessionError::Throttled {
                retry_after_ms: retry_after.as_millis() as i64,
            });
        }

        if !self.monitor.check(true).await {
            return Err(SessionError::NetworkUnavailable(
                "server unavailable".to_string(),
            ));
        }

        let api_request = self.pipeline.request(ops::LOGIN)?.json(json!({
            "email": request.email.trim(),
            "password": request.password,
        }));

        let body = match self.pipeline.execute(api_request).await {
            Ok(body) => body,
            Err(e) => {
                if matches!(
                    e,
                    SessionError::InvalidCredentials | SessionError::Validation { .. }
                ) {
                    self.throttle.on_failure().await;
                }
                tracing::warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let session = self.install_from_response(body).await?;
        let session = session.ok_or(SessionError::MalformedToken)?;

        self.throttle.on_success().await;
        if request.remember {
            if let Err(e) = self
                .session
                .store()
                .set_remembered_identifier(request.email.trim())
                .await
            {
                tracing::warn!(error = %e, "Failed to remember login identifier");
            }
        }

        tracing::info!(
            user_id = session.user.as_ref().and_then(UserRecord::id).as_deref(),
            "Logged in"
        );
        Ok(session)
    }

    /// Register a new account. Invalid input fails without a network call.
    ///
    /// If the server creates the account without issuing a token, the
    /// returned session is unauthenticated.
    pub async fn register(&self, request: RegisterRequest) -> Result<Session, SessionError> {
        request.validate().map_err(validation_error)?;
        if let Some(message) = password_policy_violation(&request.password) {
            return Err(SessionError::Validation {
                status: LOCAL_VALIDATION_STATUS,
                message: message.to_string(),
            });
        }

        let body = serde_json::to_value(&request)
            .map_err(|e| SessionError::Internal(anyhow::anyhow!(e)))?;
        let api_request = self.pipeline.request(ops::REGISTER)?.json(body);
        let response = self.pipeline.execute(api_request).await?;

        match self.install_from_response(response).await? {
            Some(session) => {
                self.throttle.on_success().await;
                tracing::info!(
                    user_id = session.user.as_ref().and_then(UserRecord::id).as_deref(),
                    "Registered and signed in"
                );
                Ok(session)
            }
            None => {
                tracing::info!("Registered, sign-in required");
                Ok(Session::default())
            }
        }
    }

    /// Install the `{ user, token }` returned by login or register.
    ///
    /// `Ok(None)` when the response carries no token.
    async fn install_from_response(&self, body: Value) -> Result<Option<Session>, SessionError> {
        let raw_token = ["token", "accessToken"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str));

        let Some(raw_token) = raw_token else {
            return Ok(None);
        };
        let new_token = token::sanitize(raw_token).ok_or(SessionError::MalformedToken)?;
        let user = body.get("user").cloned().and_then(UserRecord::from_value);

        let session = Session::authenticated(user, new_token.clone());
        self.session.install(session.clone()).await?;
        self.refresh.schedule_proactive_refresh(&new_token);
        self.observers.token_installed(&new_token);

        Ok(Some(session))
    }

    // ─── Logout ──────────────────────────────────────────────────────────────

    /// Sign out. Never fails: the remote call is best effort.
    pub async fn logout(&self) {
        if let Some(current) = self.session.token().await {
            if let Err(e) = self.remote_logout(&current).await {
                tracing::debug!(error = %e, "Remote logout failed, ignoring");
            }
        }

        self.refresh.cancel_timer();
        let was_authenticated = self.session.clear().await;
        if was_authenticated {
            self.observers.session_ended();
        }
        tracing::info!("Logged out");
    }

    // Sent without refresh handling: a 401 here just means we are already out.
    async fn remote_logout(&self, current: &str) -> Result<(), SessionError> {
        let mut request = self.pipeline.request(ops::LOGOUT)?;
        request.operation.auth = AuthMode::Anonymous;
        if let Some(header) =
            token::bearer_header(current).and_then(|h| HeaderValue::from_str(&h).ok())
        {
            request = request.header(AUTHORIZATION, header);
        }
        self.pipeline.execute(request).await.map(|_| ())
    }

    // ─── Profile ─────────────────────────────────────────────────────────────

    /// Update profile fields and merge the returned record into the session.
    pub async fn update_profile(&self, changes: Value) -> Result<UserRecord, SessionError> {
        let request = self.pipeline.request(ops::UPDATE_PROFILE)?.json(changes);
        self.update_profile_with(request).await
    }

    /// Update the profile with a prepared request (e.g. a multipart avatar upload).
    pub async fn update_profile_with(
        &self,
        request: ApiRequest,
    ) -> Result<UserRecord, SessionError> {
        if !self.session.is_authenticated().await {
            return Err(SessionError::SessionExpired);
        }

        let body = self.pipeline.execute(request).await?;
        let partial = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        let partial = UserRecord::from_value(partial).unwrap_or_default();

        self.session
            .merge_user(&partial)
            .await?
            .ok_or(SessionError::SessionExpired)
    }
}

fn validation_error(errors: ValidationErrors) -> SessionError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let message = fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {field}"))
            })
        })
        .unwrap_or_else(|| "Invalid input".to_string());

    SessionError::Validation {
        status: LOCAL_VALIDATION_STATUS,
        message,
    }
}
