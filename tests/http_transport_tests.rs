// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end tests of the reqwest transport against a local axum server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use session_core::config::Config;
use session_core::db::SessionStore;
use session_core::error::SessionError;
use session_core::services::LoginRequest;
use session_core::transport::{HttpRequest, HttpTransport, Transport, TransportError};
use session_core::SessionClient;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::mint_token;

async fn login(State(token): State<Arc<String>>, Json(body): Json<Value>) -> Response {
    if body["password"] == "Password1" {
        Json(json!({ "token": token.as_str(), "user": { "id": 42, "email": body["email"] } }))
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" })))
            .into_response()
    }
}

async fn me(State(token): State<Arc<String>>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {token}");
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if authorized {
        Json(json!({ "id": 42, "username": "alice" })).into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Serve a minimal API on an ephemeral port and return its base URL.
async fn spawn_server(token: String) -> String {
    let app = Router::new()
        .route("/api/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/api/auth/login", post(login))
        .route("/api/users/me", get(me))
        .route(
            "/api/posts",
            post(|| async { (StatusCode::BAD_REQUEST, "Caption is required") }),
        )
        .with_state(Arc::new(token));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn client_for(base_url: String) -> SessionClient {
    let config = Config {
        api_base_url: base_url,
        ..Config::default()
    };
    let transport = Arc::new(HttpTransport::new(config.http_timeout).unwrap());
    SessionClient::new(config, transport, SessionStore::new_memory())
}

#[tokio::test]
async fn test_login_and_profile_over_http() {
    let token = mint_token(3600);
    let client = client_for(spawn_server(token.clone()).await);

    let session = client
        .manager
        .login(LoginRequest {
            email: "alice@example.com".to_string(),
            password: "Password1".to_string(),
            remember: false,
        })
        .await
        .unwrap();
    assert_eq!(session.token, Some(token));

    let profile = client
        .execute(client.request("getProfile").unwrap())
        .await
        .unwrap();
    assert_eq!(profile["username"], "alice");
    assert_eq!(client.monitor.state().await.available, Some(true));
}

#[tokio::test]
async fn test_wrong_password_over_http() {
    let client = client_for(spawn_server(mint_token(3600)).await);

    let err = client
        .manager
        .login(LoginRequest {
            email: "alice@example.com".to_string(),
            password: "wrong".to_string(),
            remember: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::InvalidCredentials));
}

#[tokio::test]
async fn test_plain_text_error_body_becomes_message() {
    let client = client_for(spawn_server(mint_token(3600)).await);

    let request = client
        .request("createPost")
        .unwrap()
        .json(json!({ "caption": "" }));
    let err = client.execute(request).await.unwrap_err();

    match err {
        SessionError::Validation { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Caption is required");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
    let result = transport
        .send(HttpRequest::new(
            reqwest::Method::GET,
            format!("http://{addr}/api/health"),
        ))
        .await;

    assert!(matches!(
        result,
        Err(TransportError::Connect(_) | TransportError::Other(_))
    ));
}
