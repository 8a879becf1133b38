//! HTTP contract tests for the ticket API.
//!
//! The router runs over the in-memory store, so these exercise the full
//! request path — DTO parsing, engine dispatch, error mapping — at
//! memory speed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use noncepool_server::{build_router, AppState};
use noncepool_testing::InMemoryTicketStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    build_router(AppState::new(Arc::new(InMemoryTicketStore::new())))
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a lineage through the API and return its id.
async fn create_lineage(app: &Router, ext_id: &str, max_leased: i64) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/lineages",
            &json!({"extId": ext_id, "maxLeasedNonceCount": max_leased}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["extId"], ext_id);
    body["id"].as_str().unwrap().to_string()
}

async fn lease(app: &Router, lineage_id: &str, body: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/lineages/{lineage_id}/tickets"),
            body,
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn create_lineage_returns_id_and_ext_id() {
    let app = app();
    let id = create_lineage(&app, "account-1", 64).await;
    assert!(!id.is_empty());
}

#[tokio::test]
async fn duplicate_lineage_is_a_bad_request() {
    let app = app();
    create_lineage(&app, "account-1", 64).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/lineages",
            &json!({"extId": "account-1", "maxLeasedNonceCount": 64}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "bad_request");
}

#[tokio::test]
async fn get_lineage_round_trips() {
    let app = app();
    let id = create_lineage(&app, "account-1", 64).await;

    let response = app
        .clone()
        .oneshot(get_request("/lineages?extId=account-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["extId"], "account-1");
    assert_eq!(body["nextNonce"], 0);
    assert_eq!(body["maxLeasedNonceCount"], 64);

    let response = app
        .oneshot(get_request("/lineages?extId=unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn lease_accepts_both_request_shapes() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;

    // Single-id shape.
    let (status, body) = lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leases"][0]["extId"], "tx1");
    assert_eq!(body["leases"][0]["nonce"], 0);
    assert_eq!(body["leases"][0]["state"], "leased");
    assert_eq!(body["leases"][0]["lineageId"], lineage_id.as_str());

    // Bulk shape; tx1 is idempotent, tx2 and tx3 are fresh.
    let (status, body) = lease(&app, &lineage_id, &json!({"extIds": ["tx1", "tx2", "tx3"]})).await;
    assert_eq!(status, StatusCode::OK);
    let nonces: Vec<i64> = body["leases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lease| lease["nonce"].as_i64().unwrap())
        .collect();
    assert_eq!(nonces, vec![0, 1, 2]);
}

#[tokio::test]
async fn lease_without_ids_is_a_bad_request() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;

    let (status, body) = lease(&app, &lineage_id, &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (status, _) = lease(&app, &lineage_id, &json!({"extIds": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lease_against_unknown_lineage_is_a_bad_request() {
    let app = app();
    let (status, body) = lease(
        &app,
        "00000000-0000-4000-8000-000000000000",
        &json!({"extId": "tx1"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn malformed_lineage_id_is_a_bad_request() {
    let app = app();
    let (status, body) = lease(&app, "not-a-uuid", &json!({"extId": "tx1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn lease_cap_maps_to_429() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 2).await;

    let (status, _) = lease(&app, &lineage_id, &json!({"extIds": ["tx1", "tx2"]})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = lease(&app, &lineage_id, &json!({"extId": "failing-tx"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "too_many_leased_tickets");
}

#[tokio::test]
async fn release_recycles_through_the_api() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;
    lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/lineages/{lineage_id}/tickets/tx1"),
            &json!({"state": "released"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The released nonce is handed to the next fresh id.
    let (status, body) = lease(&app, &lineage_id, &json!({"extId": "tx2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leases"][0]["nonce"], 0);
}

#[tokio::test]
async fn close_is_terminal_through_the_api() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;
    lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;

    let close = |app: &Router| {
        app.clone().oneshot(json_request(
            "PATCH",
            &format!("/lineages/{lineage_id}/tickets/tx1"),
            &json!({"state": "closed"}),
        ))
    };

    assert_eq!(close(&app).await.unwrap().status(), StatusCode::NO_CONTENT);
    // Idempotent for callers.
    assert_eq!(close(&app).await.unwrap().status(), StatusCode::NO_CONTENT);

    // The ext id is burned.
    let (status, body) = lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn update_of_unknown_ticket_is_not_found() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/lineages/{lineage_id}/tickets/ghost"),
            &json!({"state": "released"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn update_with_unknown_state_is_a_bad_request() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;
    lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/lineages/{lineage_id}/tickets/tx1"),
            &json!({"state": "expired"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_ticket_reports_state() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;
    lease(&app, &lineage_id, &json!({"extId": "tx1"})).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/lineages/{lineage_id}/tickets/tx1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["leases"][0]["nonce"], 0);
    assert_eq!(body["leases"][0]["state"], "leased");

    let response = app
        .oneshot(get_request(&format!("/lineages/{lineage_id}/tickets/ghost")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_get_returns_the_resolvable_subset() {
    let app = app();
    let lineage_id = create_lineage(&app, "account-1", 64).await;
    lease(&app, &lineage_id, &json!({"extIds": ["tx1", "tx2"]})).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/lineages/{lineage_id}/tickets?ticketExtIds=tx1,ghost,tx2"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["leases"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(get_request(&format!(
            "/lineages/{lineage_id}/tickets?ticketExtIds=ghost"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
