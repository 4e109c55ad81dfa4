use axum::routing::{get, post};
use axum::{Json, Router, extract::Path};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde_json::json;

use courierpool_backend::AppState;
use courierpool_backend::entities::{entries, orders, rider_assignment_requests};
use courierpool_backend::handlers;
use courierpool_backend::handlers::dispatch_ws::DispatchBroadcaster;
use courierpool_backend::services::{accounts::AccountService, notifications::NotificationService};

/// AppState over a mock database; `accounts_url` is either the stub from
/// [`spawn_account_stub`] or an unroutable address for paths that must never
/// consult the account service.
pub fn test_app_state(db: DatabaseConnection, accounts_url: &str) -> AppState {
    AppState {
        db: std::sync::Arc::new(db),
        accounts: AccountService::new(accounts_url.to_string()),
        notifier: NotificationService::new(None),
        events: DispatchBroadcaster::new(),
    }
}

/// In-process account service: every rider is online/active/verified on a
/// bike; the one company is priority 0 in NG/Lagos and operates bikes.
#[allow(dead_code)]
pub async fn spawn_account_stub() -> String {
    async fn rider(Path(id): Path<String>) -> Json<serde_json::Value> {
        Json(json!({
            "id": id,
            "company_id": "company-1",
            "online": true,
            "active": true,
            "verified": true,
            "vehicle_class": "bike"
        }))
    }

    async fn company(Path(id): Path<String>) -> Json<serde_json::Value> {
        Json(json!({
            "id": id,
            "country": "NG",
            "state": "Lagos",
            "priority": 0,
            "vehicle_classes": ["bike"]
        }))
    }

    let app = Router::new()
        .route("/riders/{id}", get(rider))
        .route("/companies/{id}", get(company));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn test_router(db: DatabaseConnection) -> Router {
    test_router_with_accounts(db, "http://127.0.0.1:1")
}

pub fn test_router_with_accounts(db: DatabaseConnection, accounts_url: &str) -> Router {
    Router::new()
        .route(
            "/api/entries",
            post(handlers::entries::create_entry).get(handlers::entries::list_entries),
        )
        .route("/api/entries/{id}", get(handlers::entries::get_entry))
        .route(
            "/api/entries/{id}/payment",
            post(handlers::entries::confirm_payment),
        )
        .route(
            "/api/entries/{id}/pickup",
            post(handlers::trips::confirm_pickup),
        )
        .route(
            "/api/entries/{id}/cancel",
            post(handlers::trips::cancel_entry),
        )
        .route(
            "/api/assignments",
            get(handlers::assignments::list_assignments),
        )
        .route(
            "/api/assignments/{id}/decline",
            post(handlers::assignments::decline_assignment),
        )
        .route("/api/pool/{id}/claim", post(handlers::pool::claim_entry))
        .route(
            "/api/orders/{id}/deliver",
            post(handlers::trips::confirm_delivery),
        )
        .with_state(test_app_state(db, accounts_url))
}

pub fn entry_fixture(id: i32, status: &str) -> entries::Model {
    entries::Model {
        id,
        shipper_id: "shipper-1".to_string(),
        status: status.to_string(),
        payment_method: "card".to_string(),
        vehicle_class: "bike".to_string(),
        recipient_name: "Ada Obi".to_string(),
        recipient_phone: "+2348012345678".to_string(),
        country: "NG".to_string(),
        state: "Lagos".to_string(),
        otp_code: None,
        otp_attempts: None,
        company_id: None,
        rider_id: None,
        transaction_id: None,
        created_at: Utc::now().into(),
        company_accepted_at: None,
        rider_accepted_at: None,
        cancelled_at: None,
    }
}

pub fn order_fixture(id: i32, entry_id: i32, status: &str) -> orders::Model {
    orders::Model {
        id,
        entry_id,
        status: status.to_string(),
        otp_code: None,
        otp_attempts: None,
        company_id: None,
        rider_id: None,
        transaction_id: None,
        pickup_address: "12 Marina Rd".to_string(),
        pickup_lat: 6.45,
        pickup_lng: 3.39,
        delivery_address: "3 Allen Ave".to_string(),
        delivery_lat: 6.6,
        delivery_lng: 3.35,
        recipient_name: "Ada Obi".to_string(),
        recipient_phone: "+2348012345678".to_string(),
        cost: Decimal::new(250_000, 2),
        weight: Decimal::new(150, 2),
        created_at: Utc::now().into(),
        delivered_at: None,
    }
}

#[allow(dead_code)]
pub fn assignment_request_fixture(
    id: i32,
    entry_id: i32,
    rider_id: &str,
) -> rider_assignment_requests::Model {
    rider_assignment_requests::Model {
        id,
        entry_id,
        company_id: "company-1".to_string(),
        rider_id: rider_id.to_string(),
        status: "pending".to_string(),
        created_at: Utc::now().into(),
        resolved_at: None,
    }
}
