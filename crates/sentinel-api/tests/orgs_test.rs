//! Integration tests for the organization routes.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sentinel_core::event::EventStatus;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_invite_member_returns_201_and_stages_event() {
    let app = common::build_test_app();

    let (status, json) = common::post_json_as(
        app.app(),
        "/api/v1/orgs/org-1/invites",
        &json!({"email": " Ada@Example.com ", "role": "Member"}),
        Some("user-1"),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["email"], "ada@example.com");
    assert_eq!(json["data"]["role"], "member");
    assert_eq!(json["data"]["status"], "PENDING");
    assert_eq!(json["data"]["invitedBy"], "user-1");

    let events = app.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic, "invite.created");
    assert_eq!(events[0].status, EventStatus::Pending);
    assert_eq!(events[0].tenant_id.as_deref(), Some("org-1"));
    assert_eq!(events[0].actor_id.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn test_staged_event_carries_request_trace_id() {
    let app = common::build_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/orgs/org-1/invites")
        .header("content-type", "application/json")
        .header("x-request-id", "req-7")
        .body(Body::from(
            json!({"email": "ada@example.com", "role": "admin"}).to_string(),
        ))
        .unwrap();

    let response = app.app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.store.events()[0].trace_id.as_deref(), Some("req-7"));
}

#[tokio::test]
async fn test_duplicate_invite_returns_409_without_second_event() {
    let app = common::build_test_app();
    let body = json!({"email": "ada@example.com", "role": "member"});
    common::post_json(app.app(), "/api/v1/orgs/org-1/invites", &body).await;

    let (status, json) = common::post_json(app.app(), "/api/v1/orgs/org-1/invites", &body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "ALREADY_EXISTS");
    assert!(json["error"]["traceId"].is_string());
    assert_eq!(app.store.events().len(), 1);
}

#[tokio::test]
async fn test_invalid_email_returns_400_and_stages_nothing() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        app.app(),
        "/api/v1/orgs/org-1/invites",
        &json!({"email": "not-an-email", "role": "member"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
    assert!(app.store.events().is_empty());
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        app.app(),
        "/api/v1/orgs/org-1/invites",
        &json!({"email": "ada@example.com"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_accept_invite_adds_member_once() {
    let app = common::build_test_app();
    let (_, invite) = common::post_json(
        app.app(),
        "/api/v1/orgs/org-1/invites",
        &json!({"email": "ada@example.com", "role": "viewer"}),
    )
    .await;
    let invite_id = invite["data"]["id"].as_str().unwrap().to_owned();
    let uri = format!("/api/v1/orgs/org-1/invites/{invite_id}/accept");

    let (status, json) = common::post_json(app.app(), &uri, &json!({"userId": "user-9"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["userId"], "user-9");
    assert_eq!(json["data"]["role"], "viewer");

    let (status, json) = common::post_json(app.app(), &uri, &json!({"userId": "user-9"})).await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(json["error"]["code"], "FAILED_PRECONDITION");
    let mut topics: Vec<String> = app.store.events().into_iter().map(|e| e.topic).collect();
    topics.sort();
    assert_eq!(topics, vec!["invite.accepted", "invite.created"]);
}

#[tokio::test]
async fn test_accept_unknown_invite_returns_404() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        app.app(),
        "/api/v1/orgs/org-1/invites/missing/accept",
        &json!({"userId": "user-9"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_remove_member_publishes_member_removed() {
    let app = common::build_test_app();
    let (_, invite) = common::post_json(
        app.app(),
        "/api/v1/orgs/org-1/invites",
        &json!({"email": "ada@example.com", "role": "member"}),
    )
    .await;
    let invite_id = invite["data"]["id"].as_str().unwrap().to_owned();
    common::post_json(
        app.app(),
        &format!("/api/v1/orgs/org-1/invites/{invite_id}/accept"),
        &json!({"userId": "user-9"}),
    )
    .await;

    let (status, json) =
        common::delete_as(app.app(), "/api/v1/orgs/org-1/members/user-9", Some("admin-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["removedBy"], "admin-1");
    assert!(
        app.store
            .events()
            .iter()
            .any(|e| e.topic == "member.removed" && e.actor_id.as_deref() == Some("admin-1"))
    );
}

#[tokio::test]
async fn test_remove_unknown_member_returns_404() {
    let app = common::build_test_app();

    let (status, json) =
        common::delete_as(app.app(), "/api/v1/orgs/org-1/members/nobody", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(app.store.events().is_empty());
}
