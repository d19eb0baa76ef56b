// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use futures_util::future::BoxFuture;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use session_core::config::Config;
use session_core::db::SessionStore;
use session_core::models::{Session, UserRecord};
use session_core::services::SessionObserver;
use session_core::time_utils;
use session_core::transport::{HttpRequest, HttpResponse, RequestBody, Transport, TransportError};
use session_core::SessionClient;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "http://localhost:5000/api";

/// Scripted outcome for one call.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Reply {
    Status(u16, Value),
    Timeout,
    Refused,
}

#[allow(dead_code)]
impl Reply {
    pub fn ok(body: Value) -> Self {
        Reply::Status(200, body)
    }

    fn into_result(self) -> Result<HttpResponse, TransportError> {
        match self {
            Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Refused => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

/// One request seen by the mock.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;
type RouteKey = (Method, String);

/// Transport that answers from per-route scripts.
///
/// Queued replies are consumed in order and the last one repeats. Routes
/// with a handler compute the reply from the request. Unscripted routes
/// answer 404, except the health path which answers 200.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<RouteKey, VecDeque<Reply>>>,
    handlers: Mutex<HashMap<RouteKey, Handler>>,
    calls: Mutex<Vec<Recorded>>,
    latency: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue replies for `method path`.
    pub fn script(&self, method: Method, path: &str, replies: Vec<Reply>) {
        self.queued
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .extend(replies);
    }

    pub fn on(&self, method: Method, path: &str, reply: Reply) {
        self.script(method, path, vec![reply]);
    }

    /// Compute replies for `method path` from the request.
    pub fn handle<F>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(&HttpRequest) -> Reply + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Box::new(handler));
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Paths requested, excluding health probes.
    pub fn paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path != "/health")
            .map(|c| c.path.clone())
            .collect()
    }

    fn reply_for(&self, request: &HttpRequest, key: &RouteKey) -> Reply {
        if let Some(queue) = self.queued.lock().unwrap().get_mut(key) {
            if queue.len() > 1 {
                return queue.pop_front().unwrap();
            }
            if let Some(last) = queue.front() {
                return last.clone();
            }
        }
        if let Some(handler) = self.handlers.lock().unwrap().get(key) {
            return handler(request);
        }
        if key.1 == "/health" {
            return Reply::ok(json!({ "status": "ok" }));
        }
        Reply::Status(404, json!({ "message": "Not found" }))
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let path = request
                .url
                .strip_prefix(BASE_URL)
                .unwrap_or(&request.url)
                .to_string();
            let key = (request.method.clone(), path.clone());

            self.calls.lock().unwrap().push(Recorded {
                method: request.method.clone(),
                path,
                authorization: request
                    .headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                content_type: request
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body: request.body.clone(),
                timeout: request.timeout,
            });

            let latency = *self.latency.lock().unwrap();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            self.reply_for(&request, &key).into_result()
        })
    }
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[allow(dead_code)]
pub fn now_secs() -> i64 {
    time_utils::now_millis() / 1000
}

/// Sign a token issued now and expiring `lifetime_secs` from now.
#[allow(dead_code)]
pub fn mint_token(lifetime_secs: i64) -> String {
    mint_token_at(now_secs(), now_secs() + lifetime_secs)
}

/// Sign a token with explicit `iat`/`exp` (seconds since the epoch).
#[allow(dead_code)]
pub fn mint_token_at(iat: i64, exp: i64) -> String {
    let claims = TestClaims {
        sub: "user-1".to_string(),
        iat,
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-signing-key"),
    )
    .expect("Failed to sign test token")
}

#[allow(dead_code)]
pub fn test_user() -> UserRecord {
    UserRecord::from_value(json!({
        "id": "user-1",
        "username": "alice",
        "email": "alice@example.com",
    }))
    .unwrap()
}

/// Client over the mock transport with an in-memory store.
#[allow(dead_code)]
pub fn test_client(transport: Arc<MockTransport>) -> SessionClient {
    SessionClient::new(Config::default(), transport, SessionStore::new_memory())
}

/// Client already signed in with `token`.
#[allow(dead_code)]
pub async fn signed_in_client(transport: Arc<MockTransport>, token: &str) -> SessionClient {
    let client = test_client(transport);
    client
        .session
        .install(Session::authenticated(Some(test_user()), token.to_string()))
        .await
        .unwrap();
    client
}

/// Observer that counts notifications.
#[derive(Default)]
#[allow(dead_code)]
pub struct CountingObserver {
    pub reconnects: AtomicUsize,
    pub ended: AtomicUsize,
}

#[allow(dead_code)]
impl CountingObserver {
    pub fn attach(client: &SessionClient) -> Arc<Self> {
        let observer = Arc::new(Self::default());
        client.observers.register(observer.clone());
        observer
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

impl SessionObserver for CountingObserver {
    fn reconnect_with_token(&self, _token: &str) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn session_ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}
