mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::{Value, json};
use tower::ServiceExt;

use courierpool_backend::entities::{transactions, trip_events};
use courierpool_backend::models::otp::OtpAttempt;

use crate::common::{
    assignment_request_fixture, entry_fixture, order_fixture, spawn_account_stub, test_router,
    test_router_with_accounts,
};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_get_entry_returns_entry_with_orders() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(7, "pending")]])
        .append_query_results([vec![
            order_fixture(70, 7, "pending"),
            order_fixture(71, 7, "pending"),
        ]])
        .into_connection();

    let response = common::test_router(db)
        .oneshot(get("/api/entries/7"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], 7);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["orders"].as_array().unwrap().len(), 2);
    assert_eq!(json["orders"][0]["entry_id"], 7);
}

#[tokio::test]
async fn test_get_unknown_entry_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<courierpool_backend::entities::entries::Model>::new()])
        .into_connection();

    let response = test_router(db).oneshot(get("/api/entries/99")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_create_entry_rejects_empty_order_list() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

    let body = json!({
        "shipper_id": "shipper-1",
        "payment_method": "card",
        "vehicle_class": "bike",
        "recipient_name": "Ada Obi",
        "recipient_phone": "+2348012345678",
        "country": "NG",
        "state": "Lagos",
        "orders": []
    });
    let response = test_router(db)
        .oneshot(post_json("/api/entries", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_create_entry_persists_entry_and_orders() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(1, "request")]])
        .append_query_results([vec![order_fixture(10, 1, "request")]])
        .into_connection();

    let body = json!({
        "shipper_id": "shipper-1",
        "payment_method": "card",
        "vehicle_class": "bike",
        "recipient_name": "Ada Obi",
        "recipient_phone": "+2348012345678",
        "country": "NG",
        "state": "Lagos",
        "orders": [{
            "pickup_address": "12 Marina Rd",
            "pickup_lat": 6.45,
            "pickup_lng": 3.39,
            "delivery_address": "3 Allen Ave",
            "delivery_lat": 6.6,
            "delivery_lng": 3.35,
            "recipient_name": "Ada Obi",
            "recipient_phone": "+2348012345678",
            "cost": 2500.00,
            "weight": 1.50
        }]
    });
    let response = test_router(db)
        .oneshot(post_json("/api/entries", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "request");
    assert_eq!(json["orders"].as_array().unwrap().len(), 1);
    assert!(json["company_id"].is_null());
}

fn transaction_fixture(id: i32, entry_id: i32) -> transactions::Model {
    transactions::Model {
        id,
        entry_id,
        payment_method: "card".to_string(),
        amount: Decimal::new(250_000, 2),
        status: "approved".to_string(),
        reference: "psp-ref-1".to_string(),
        company_id: None,
        rider_id: None,
        created_at: Utc::now().into(),
        approved_at: Some(Utc::now().into()),
    }
}

#[tokio::test]
async fn test_confirm_payment_moves_entry_into_pool() {
    let mut pooled = entry_fixture(1, "pending");
    pooled.transaction_id = Some(5);

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(1, "request")]])
        .append_query_results([vec![transaction_fixture(5, 1)]])
        .append_query_results([vec![pooled]])
        .append_query_results([vec![order_fixture(10, 1, "pending")]])
        .append_exec_results([
            // entry request -> pending, then orders mirror
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();

    let body = json!({ "amount": 2500.00, "approved": true, "reference": "psp-ref-1" });
    let response = test_router(db)
        .oneshot(post_json("/api/entries/1/payment", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["transaction_id"], 5);
}

#[tokio::test]
async fn test_declined_payment_leaves_entry_untouched() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(1, "request")]])
        .into_connection();

    let body = json!({ "amount": 2500.00, "approved": false, "reference": "psp-ref-1" });
    let response = test_router(db)
        .oneshot(post_json("/api/entries/1/payment", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "upstream_error");
}

#[tokio::test]
async fn test_confirm_payment_requires_request_state() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(1, "pending")]])
        .into_connection();

    let body = json!({ "amount": 2500.00, "approved": true, "reference": "psp-ref-2" });
    let response = test_router(db)
        .oneshot(post_json("/api/entries/1/payment", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

fn arrived_entry(id: i32) -> courierpool_backend::entities::entries::Model {
    let mut entry = entry_fixture(id, "arrivedAtPickup");
    entry.otp_code = Some("1234".to_string());
    entry.company_id = Some("company-1".to_string());
    entry.rider_id = Some("rider-1".to_string());
    entry
}

#[tokio::test]
async fn test_wrong_pickup_code_counts_down_tries() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![arrived_entry(3)]])
        .append_exec_results([
            // failed attempt appended outside any transition
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();
    let accounts = spawn_account_stub().await;

    let body = json!({ "rider_id": "rider-1", "code": "9999", "lat": 6.45, "lng": 3.39 });
    let response = test_router_with_accounts(db, &accounts)
        .oneshot(post_json("/api/entries/3/pickup", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(
        json["message"].as_str().unwrap().contains("2 tries left"),
        "unexpected message: {}",
        json["message"]
    );
}

#[tokio::test]
async fn test_pickup_code_rejected_during_cooldown() {
    let now = Utc::now();
    let attempts: Vec<OtpAttempt> = (1..=3)
        .map(|i| OtpAttempt {
            code: "0000".to_string(),
            lat: None,
            lng: None,
            at: now - Duration::seconds(90 - i * 10),
        })
        .collect();

    let mut entry = arrived_entry(3);
    entry.otp_attempts = Some(serde_json::to_value(&attempts).unwrap());

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry]])
        .into_connection();
    let accounts = spawn_account_stub().await;

    // Correct code, but the cool-down is in force
    let body = json!({ "rider_id": "rider-1", "code": "1234", "lat": 6.45, "lng": 3.39 });
    let response = test_router_with_accounts(db, &accounts)
        .oneshot(post_json("/api/entries/3/pickup", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["error"], "rate_limited");
    let retry = json["retry_after_secs"].as_i64().unwrap();
    assert!(retry > 0 && retry <= 600, "retry_after out of range: {retry}");
}

fn trip_event_fixture(id: i32, entry_id: i32, order_id: i32) -> trip_events::Model {
    trip_events::Model {
        id,
        event_type: "pickedup".to_string(),
        rider_id: Some("rider-1".to_string()),
        entry_id,
        order_id,
        lat: Some(6.45),
        lng: Some(3.39),
        metadata: None,
        created_at: Utc::now().into(),
    }
}

#[tokio::test]
async fn test_correct_pickup_code_advances_entry() {
    let mut picked = entry_fixture(3, "pickedup");
    picked.company_id = Some("company-1".to_string());
    picked.rider_id = Some("rider-1".to_string());

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![arrived_entry(3)]])
        // orders enumerated for the audit log inside the transaction
        .append_query_results([vec![order_fixture(30, 3, "arrivedAtPickup")]])
        .append_query_results([vec![trip_event_fixture(1, 3, 30)]])
        .append_query_results([vec![picked]])
        .append_query_results([vec![order_fixture(30, 3, "pickedup")]])
        .append_exec_results([
            // entry arrivedAtPickup -> pickedup, then orders mirror
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();
    let accounts = spawn_account_stub().await;

    let body = json!({ "rider_id": "rider-1", "code": "1234", "lat": 6.45, "lng": 3.39 });
    let response = test_router_with_accounts(db, &accounts)
        .oneshot(post_json("/api/entries/3/pickup", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pickedup");
}

#[tokio::test]
async fn test_claim_honors_tier_visibility_delay() {
    // Fresh pending entry; the stub company is priority 0 and must wait 30 min
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(5, "pending")]])
        .into_connection();
    let accounts = spawn_account_stub().await;

    let response = test_router_with_accounts(db, &accounts)
        .oneshot(post_json(
            "/api/pool/5/claim",
            json!({ "company_id": "company-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "conflict");
    assert!(
        json["message"].as_str().unwrap().contains("not yet visible"),
        "unexpected message: {}",
        json["message"]
    );
}

#[tokio::test]
async fn test_last_delivery_completes_entry_despite_stale_entry_read() {
    let mut order = order_fixture(30, 3, "arrivedAtDelivery");
    order.otp_code = Some("5678".to_string());
    order.rider_id = Some("rider-1".to_string());

    // Entry row read at a status a sibling transition has since moved past
    let mut entry = entry_fixture(3, "enrouteToDelivery");
    entry.company_id = Some("company-1".to_string());
    entry.rider_id = Some("rider-1".to_string());

    let mut delivered = order_fixture(30, 3, "delivered");
    delivered.rider_id = Some("rider-1".to_string());
    let mut completed = entry_fixture(3, "completed");
    completed.rider_id = Some("rider-1".to_string());

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![order]])
        .append_query_results([vec![entry]])
        .append_query_results([vec![trip_event_fixture(1, 3, 30)]])
        // no undelivered siblings remain
        .append_query_results([Vec::<courierpool_backend::entities::orders::Model>::new()])
        .append_query_results([vec![delivered.clone()]])
        .append_query_results([vec![trip_event_fixture(2, 3, 30)]])
        .append_query_results([vec![completed]])
        .append_query_results([vec![delivered]])
        .append_exec_results([
            // order delivered, then the entry completion update
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .into_connection();
    let accounts = spawn_account_stub().await;

    let body = json!({ "rider_id": "rider-1", "code": "5678", "lat": 6.6, "lng": 3.35 });
    let response = test_router_with_accounts(db, &accounts)
        .oneshot(post_json("/api/orders/30/deliver", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["orders"][0]["status"], "delivered");
}

#[tokio::test]
async fn test_pickup_confirmation_requires_assigned_rider() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![arrived_entry(3)]])
        .into_connection();

    let body = json!({ "rider_id": "somebody-else", "code": "1234" });
    let response = test_router(db)
        .oneshot(post_json("/api/entries/3/pickup", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_window_closes_once_delivered() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry_fixture(4, "delivered")]])
        .into_connection();

    let response = test_router(db)
        .oneshot(post_json("/api/entries/4/cancel", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "conflict");
}

#[tokio::test]
async fn test_list_assignments_returns_pending_offers() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![
            assignment_request_fixture(11, 1, "rider-1"),
            assignment_request_fixture(12, 2, "rider-1"),
        ]])
        .into_connection();

    let response = test_router(db)
        .oneshot(get("/api/assignments?rider_id=rider-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["entry_id"], 1);
    assert_eq!(rows[0]["status"], "pending");
}

#[tokio::test]
async fn test_decline_of_foreign_request_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();

    let response = test_router(db)
        .oneshot(post_json(
            "/api/assignments/11/decline",
            json!({ "rider_id": "rider-2" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
