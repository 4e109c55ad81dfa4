use axum::{
    Json, Router,
    routing::{get, post},
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use std::env;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courierpool_backend::handlers::{self, dispatch_ws::DispatchBroadcaster};
use courierpool_backend::services::{accounts::AccountService, notifications::NotificationService};
use courierpool_backend::{AppState, jobs};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courierpool_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let db = std::sync::Arc::new(db);

    let accounts = AccountService::new(
        env::var("ACCOUNT_SERVICE_URL").unwrap_or_else(|_| "http://localhost:4100".to_string()),
    );
    let notifier = NotificationService::new(env::var("NOTIFY_SERVICE_URL").ok());
    let events = DispatchBroadcaster::new();

    let state = AppState {
        db: db.clone(),
        accounts,
        notifier,
        events: events.clone(),
    };

    // Background reclamation sweeper
    jobs::pool_sweeper::start_pool_sweeper_job(db, events).await;

    // Build router
    let app = Router::new()
        .route("/", get(health))
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
            "/api/entries/{id}/events",
            get(handlers::entries::get_entry_events),
        )
        .route(
            "/api/entries/{id}/enroute-pickup",
            post(handlers::trips::enroute_to_pickup),
        )
        .route(
            "/api/entries/{id}/arrive-pickup",
            post(handlers::trips::arrive_at_pickup),
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
            "/api/orders/{id}/enroute",
            post(handlers::trips::enroute_to_delivery),
        )
        .route(
            "/api/orders/{id}/arrive",
            post(handlers::trips::arrive_at_delivery),
        )
        .route(
            "/api/orders/{id}/deliver",
            post(handlers::trips::confirm_delivery),
        )
        .route("/api/pool", get(handlers::pool::get_pool))
        .route("/api/pool/{id}/claim", post(handlers::pool::claim_entry))
        .route(
            "/api/assignments",
            get(handlers::assignments::list_assignments),
        )
        .route(
            "/api/assignments/{id}/accept",
            post(handlers::assignments::accept_assignment),
        )
        .route(
            "/api/assignments/{id}/decline",
            post(handlers::assignments::decline_assignment),
        )
        .route(
            "/api/dispatch/ws",
            get(handlers::dispatch_ws::dispatch_websocket),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
