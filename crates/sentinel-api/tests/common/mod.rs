//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use sentinel_api::config::Config;
use sentinel_api::routes;
use sentinel_api::state::{AppState, build_state};
use sentinel_core::clock::Clock;
use sentinel_resilience::rate_limit::{RateLimiter, Unlimited};
use sentinel_test_support::{InMemoryStore, ManualClock};
use tower::ServiceExt;

/// App under test plus handles on its collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// A fresh clone of the router for one request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Default configuration plus `extra` overrides.
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([(
        "DATABASE_URL".to_owned(),
        "postgres://unused/test".to_owned(),
    )]);
    for (key, value) in extra {
        vars.insert((*key).to_owned(), (*value).to_owned());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// Build the full app over an `InMemoryStore` and a manual clock, using the
/// same router as `main.rs`.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(&[]), Arc::new(Unlimited))
}

/// Build the app with custom configuration and rate limiter.
pub fn build_test_app_with(config: Config, rate_limiter: Arc<dyn RateLimiter>) -> TestApp {
    let store = InMemoryStore::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap(),
    ));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let state = build_state(&config, Arc::new(store.clone()), dyn_clock, rate_limiter).unwrap();

    TestApp {
        router: routes::router(state.clone()),
        state,
        store,
        clock,
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_json_as(app, uri, body, None).await
}

/// Send a POST request with a JSON body and an optional `x-actor-id`.
pub async fn post_json_as(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
    actor: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request with no body.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a DELETE request with an optional `x-actor-id`.
pub async fn delete_as(
    app: Router,
    uri: &str,
    actor: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let request = builder.body(Body::empty()).unwrap();

    send(app, request).await
}
