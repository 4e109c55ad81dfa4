//! Rider trip-execution endpoints: pickup and delivery legs, OTP verification,
//! and administrative cancellation

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use crate::AppState;
use crate::models::entry::{EntryResponse, EntryStatus};
use crate::models::error::Result;
use crate::models::otp::{RiderProgressRequest, VerifyOtpRequest};
use crate::services::lifecycle::LifecycleService;

/// POST /api/entries/{id}/enroute-pickup
pub async fn enroute_to_pickup(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<RiderProgressRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .rider_progress_entry(entry_id, EntryStatus::EnrouteToPickup, payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/entries/{id}/arrive-pickup - issues the pickup OTP
pub async fn arrive_at_pickup(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<RiderProgressRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .rider_progress_entry(entry_id, EntryStatus::ArrivedAtPickup, payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/entries/{id}/pickup - verify the pickup OTP (and cash collection)
pub async fn confirm_pickup(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .confirm_pickup(entry_id, payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/orders/{id}/enroute - start this parcel's delivery leg
pub async fn enroute_to_delivery(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    Json(payload): Json<RiderProgressRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .rider_progress_order(order_id, EntryStatus::EnrouteToDelivery, payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/orders/{id}/arrive - issues this parcel's delivery OTP
pub async fn arrive_at_delivery(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    Json(payload): Json<RiderProgressRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .rider_progress_order(order_id, EntryStatus::ArrivedAtDelivery, payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/orders/{id}/deliver - verify this parcel's delivery OTP
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .confirm_delivery(order_id, payload)
        .await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelRequest {
    pub rider_id: Option<String>,
}

/// POST /api/entries/{id}/cancel - administrative cancellation
pub async fn cancel_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .cancel_entry(entry_id, payload.rider_id)
        .await?;
    Ok(Json(entry))
}
