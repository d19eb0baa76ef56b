// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog of logical API operations.
//!
//! Each operation lists its candidate paths in the order they are tried,
//! its idempotence class, how it authenticates, and the payload returned
//! when a read degrades.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::transport::{FormPart, RequestBody};

/// Tolerance for silent degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotence {
    /// Exhaustion resolves to the operation's empty default
    Read,
    /// Exhaustion propagates the last error
    Write,
}

/// How an operation authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach the session token; a 401 triggers one refresh-and-retry
    Bearer,
    /// Submits credentials; a 401 means they are wrong
    Credentials,
    /// No token attached
    Anonymous,
}

/// A logical operation and its endpoint candidates.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub method: Method,
    /// Path templates; `{name}` segments are filled from request params
    pub candidates: Vec<String>,
    pub idempotence: Idempotence,
    pub auth: AuthMode,
    pub empty_default: Value,
}

impl Operation {
    /// A GET operation that degrades to `Null`.
    pub fn read(name: &str, candidates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            method: Method::GET,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            idempotence: Idempotence::Read,
            auth: AuthMode::Bearer,
            empty_default: Value::Null,
        }
    }

    /// A state-changing operation.
    pub fn write(name: &str, method: Method, candidates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            method,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            idempotence: Idempotence::Write,
            auth: AuthMode::Bearer,
            empty_default: Value::Null,
        }
    }

    pub fn with_default(mut self, empty_default: Value) -> Self {
        self.empty_default = empty_default;
        self
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }
}

/// One call of an operation.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub operation: Operation,
    pub params: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            params: Vec::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn binary(mut self, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        self.body = RequestBody::Binary {
            bytes,
            content_type: content_type.map(str::to_string),
        };
        self
    }

    /// Fill a path template from params and append the query string.
    pub fn resolve_path(&self, template: &str) -> String {
        let mut path = template.to_string();
        for (name, value) in &self.params {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }

        if self.query.is_empty() {
            return path;
        }

        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if path.contains('?') { '&' } else { '?' };
        format!("{path}{separator}{query}")
    }
}

/// Operation names used by the session façade.
pub mod ops {
    pub const LOGIN: &str = "login";
    pub const REGISTER: &str = "register";
    pub const LOGOUT: &str = "logout";
    pub const GET_PROFILE: &str = "getProfile";
    pub const UPDATE_PROFILE: &str = "updateProfile";
}

/// Registry of known operations.
#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    operations: HashMap<String, Operation>,
}

impl EndpointCatalog {
    pub fn empty() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    pub fn register(&mut self, operation: Operation) {
        self.operations.insert(operation.name.clone(), operation);
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Start a request for a registered operation.
    pub fn request(&self, name: &str) -> Option<ApiRequest> {
        self.get(name).cloned().map(ApiRequest::new)
    }
}

impl Default for EndpointCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();

        // Session
        catalog.register(
            Operation::write(ops::LOGIN, Method::POST, &["/auth/login", "/users/login"])
                .with_auth(AuthMode::Credentials),
        );
        catalog.register(
            Operation::write(
                ops::REGISTER,
                Method::POST,
                &["/auth/register", "/users/register", "/auth/signup"],
            )
            .with_auth(AuthMode::Credentials),
        );
        catalog.register(Operation::write(
            ops::LOGOUT,
            Method::POST,
            &["/auth/logout", "/users/logout"],
        ));
        catalog.register(
            Operation::read(ops::GET_PROFILE, &["/users/me", "/auth/me", "/users/profile"])
                .with_default(json!({})),
        );
        catalog.register(Operation::write(
            ops::UPDATE_PROFILE,
            Method::PUT,
            &["/users/profile", "/users/me", "/users/update-profile"],
        ));

        // Posts
        catalog.register(
            Operation::read("getFeed", &["/posts/feed", "/posts"]).with_default(json!([])),
        );
        catalog.register(
            Operation::read("getUserPosts", &["/posts/user/{userId}", "/users/{userId}/posts"])
                .with_default(json!([])),
        );
        catalog.register(Operation::write(
            "createPost",
            Method::POST,
            &["/posts", "/posts/create"],
        ));
        catalog.register(Operation::write(
            "likePost",
            Method::POST,
            &["/posts/{postId}/like", "/posts/like/{postId}"],
        ));
        catalog.register(Operation::write(
            "deletePost",
            Method::DELETE,
            &["/posts/{postId}"],
        ));

        // Reels and stories
        catalog.register(
            Operation::read("getReels", &["/reels", "/reels/feed"]).with_default(json!([])),
        );
        catalog.register(Operation::write(
            "createReel",
            Method::POST,
            &["/reels", "/reels/upload"],
        ));
        catalog.register(
            Operation::read("getStories", &["/stories", "/stories/feed"]).with_default(json!([])),
        );
        catalog.register(Operation::write("createStory", Method::POST, &["/stories"]));

        // Shop and notifications
        catalog.register(
            Operation::read("getProducts", &["/shop/products", "/products"])
                .with_default(json!([])),
        );
        catalog.register(
            Operation::read("getNotifications", &["/notifications", "/users/notifications"])
                .with_default(json!([])),
        );
        catalog.register(
            Operation::read("searchUsers", &["/users/search", "/search/users"])
                .with_default(json!([])),
        );

        catalog
    }
}
