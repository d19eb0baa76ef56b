// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resilient request pipeline.
//!
//! Handles:
//! - Token attachment (normalized `Bearer` header)
//! - Ordered endpoint fallback, advancing only on 404, 401 and 5xx
//! - One refresh-and-retry per request on 401
//! - Empty defaults for exhausted reads, normalized errors for writes
//! - Feeding call outcomes back into the availability monitor

use crate::config::Config;
use crate::error::SessionError;
use crate::services::availability::AvailabilityMonitor;
use crate::services::endpoints::{ApiRequest, AuthMode, EndpointCatalog, Idempotence};
use crate::services::refresh::{RefreshCoordinator, RetryMark};
use crate::state::SessionState;
use crate::token;
use crate::transport::{HttpRequest, HttpResponse, RequestBody, Transport};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Whether a status sends the request on to the next candidate endpoint.
///
/// 404 and 5xx suggest the endpoint is wrong or down; 401 without a token
/// suggests the endpoint wants different auth. Any other 4xx means the request
/// itself is invalid and is terminal.
pub fn should_advance(status: u16) -> bool {
    status == 401 || status == 404 || (500..600).contains(&status)
}

/// Outbound call wrapper shared by every operation.
pub struct RequestPipeline {
    config: Config,
    transport: Arc<dyn Transport>,
    session: Arc<SessionState>,
    monitor: Arc<AvailabilityMonitor>,
    refresh: Arc<RefreshCoordinator>,
    catalog: EndpointCatalog,
}

/// How one candidate attempt ended.
enum Attempt {
    Done(Value),
    Advance(SessionError),
    Exhausted(SessionError),
}

impl RequestPipeline {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        session: Arc<SessionState>,
        monitor: Arc<AvailabilityMonitor>,
        refresh: Arc<RefreshCoordinator>,
        catalog: EndpointCatalog,
    ) -> Self {
        Self {
            config: config.clone(),
            transport,
            session,
            monitor,
            refresh,
            catalog,
        }
    }

    pub fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    /// Start a request for a catalog operation.
    pub fn request(&self, operation: &str) -> Result<ApiRequest, SessionError> {
        self.catalog.request(operation).ok_or_else(|| {
            SessionError::Internal(anyhow::anyhow!("unknown operation: {operation}"))
        })
    }

    /// Execute a request through fallback, refresh and degradation rules.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, SessionError> {
        let operation = &request.operation;
        let mut mark = RetryMark::default();
        let mut last_error = None;

        for (index, template) in operation.candidates.iter().enumerate() {
            let url = self.config.url(&request.resolve_path(template));

            match self.attempt(&request, &url, &mut mark).await? {
                Attempt::Done(body) => return Ok(body),
                Attempt::Advance(error) => {
                    tracing::info!(
                        operation = %operation.name,
                        candidate = index,
                        error = %error,
                        "Endpoint candidate failed, trying next"
                    );
                    last_error = Some(error);
                }
                Attempt::Exhausted(error) => {
                    last_error = Some(error);
                    break;
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            SessionError::Internal(anyhow::anyhow!(
                "operation {} has no endpoints",
                operation.name
            ))
        });

        match operation.idempotence {
            Idempotence::Read => {
                tracing::warn!(
                    operation = %operation.name,
                    error = %error,
                    "Read exhausted all endpoints, returning empty default"
                );
                Ok(operation.empty_default.clone())
            }
            Idempotence::Write => {
                tracing::warn!(operation = %operation.name, error = %error, "Write failed");
                Err(error)
            }
        }
    }

    /// Try one candidate, including its single refresh-and-retry.
    ///
    /// `Err` is terminal for the whole request.
    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &str,
        mark: &mut RetryMark,
    ) -> Result<Attempt, SessionError> {
        let auth = request.operation.auth;
        let mut token = match auth {
            AuthMode::Bearer => self.session.token().await,
            _ => None,
        };

        loop {
            let http = self.build(request, url, token.as_deref());
            let attached = http.headers.contains_key(AUTHORIZATION);

            let response = match self.transport.send(http).await {
                Ok(response) => response,
                Err(e) => {
                    self.monitor.report_transport_failure().await;
                    return Ok(Attempt::Exhausted(SessionError::NetworkUnavailable(
                        e.to_string(),
                    )));
                }
            };

            if response.is_success() {
                self.monitor.mark_available().await;
                return Ok(Attempt::Done(response.body));
            }

            let status = response.status;
            tracing::debug!(operation = %request.operation.name, status, url, "Request failed");

            if status == 401 {
                match auth {
                    AuthMode::Credentials => return Err(SessionError::InvalidCredentials),
                    AuthMode::Bearer if attached && !mark.is_retried() => {
                        match self
                            .refresh
                            .on_expired_during_request(token.as_deref(), mark)
                            .await
                        {
                            Ok(new_token) => {
                                token = Some(new_token);
                                continue;
                            }
                            Err(failure) => {
                                tracing::warn!(error = %failure, "Refresh after 401 failed");
                                return Err(SessionError::SessionExpired);
                            }
                        }
                    }
                    AuthMode::Bearer if attached => {
                        tracing::warn!(
                            operation = %request.operation.name,
                            "Second 401 after refresh, ending session"
                        );
                        self.refresh.expire_session(self.session.epoch()).await;
                        return Err(SessionError::SessionExpired);
                    }
                    _ => {}
                }
            }

            let error = error_from_response(&response);
            if should_advance(status) {
                return Ok(Attempt::Advance(error));
            }
            return Err(error);
        }
    }

    fn build(&self, request: &ApiRequest, url: &str, token: Option<&str>) -> HttpRequest {
        let mut headers = request.headers.clone();

        // Non-bearer operations keep whatever the caller set.
        if request.operation.auth == AuthMode::Bearer {
            match token
                .and_then(token::bearer_header)
                .and_then(|h| HeaderValue::from_str(&h).ok())
            {
                Some(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                None => {
                    headers.remove(AUTHORIZATION);
                }
            }
        }

        // Let the transport pick the multipart boundary / binary media type.
        if request.body.is_form_or_binary() {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
        } else if matches!(request.body, RequestBody::Json(_)) && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        HttpRequest {
            method: request.operation.method.clone(),
            url: url.to_string(),
            headers,
            body: request.body.clone(),
            timeout: Some(self.request_timeout(request)),
        }
    }

    fn request_timeout(&self, request: &ApiRequest) -> Duration {
        // Uploads get longer than ordinary calls.
        if request.body.is_form_or_binary() {
            self.config.http_timeout * 4
        } else {
            self.config.http_timeout
        }
    }
}

fn error_from_response(response: &HttpResponse) -> SessionError {
    let message = response.message().unwrap_or_default();
    SessionError::from_status(response.status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_policy() {
        for status in [401, 404, 500, 502, 503, 504] {
            assert!(should_advance(status), "{status} should advance");
        }
        for status in [400, 403, 409, 413, 415, 422, 429] {
            assert!(!should_advance(status), "{status} should be terminal");
        }
    }
}
