//! Shipper-facing entry endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::AppState;
use crate::entities::{entries, orders, prelude::*, trip_events};
use crate::models::entry::{CreateEntryRequest, EntryResponse, PaymentOutcomeRequest};
use crate::models::error::{DispatchError, Result};
use crate::services::lifecycle::LifecycleService;

/// POST /api/entries - create a delivery request with its parcels
pub async fn create_entry(
    State(state): State<AppState>,
    Json(payload): Json<CreateEntryRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .create_entry(payload)
        .await?;
    Ok(Json(entry))
}

/// POST /api/entries/{id}/payment - payment service reports the charge outcome
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<PaymentOutcomeRequest>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .confirm_payment(entry_id, payload)
        .await?;
    Ok(Json(entry))
}

/// GET /api/entries/{id}
pub async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
) -> Result<Json<EntryResponse>> {
    let entry = LifecycleService::from_state(&state)
        .get_entry(entry_id)
        .await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub shipper: String,
}

/// GET /api/entries?shipper= - a shipper's entries, newest first
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<EntryResponse>>> {
    let entry_rows = Entries::find()
        .filter(entries::Column::ShipperId.eq(&query.shipper))
        .order_by_desc(entries::Column::CreatedAt)
        .all(state.db.as_ref())
        .await?;

    let mut responses = Vec::with_capacity(entry_rows.len());
    for entry in entry_rows {
        let order_rows = Orders::find()
            .filter(orders::Column::EntryId.eq(entry.id))
            .all(state.db.as_ref())
            .await?;
        responses.push(EntryResponse::from_models(entry, order_rows));
    }
    Ok(Json(responses))
}

/// GET /api/entries/{id}/events - audit trail, oldest first
pub async fn get_entry_events(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
) -> Result<Json<Vec<trip_events::Model>>> {
    let exists = Entries::find_by_id(entry_id).one(state.db.as_ref()).await?;
    if exists.is_none() {
        return Err(DispatchError::NotFound("entry"));
    }

    let rows = TripEvents::find()
        .filter(trip_events::Column::EntryId.eq(entry_id))
        .order_by_asc(trip_events::Column::CreatedAt)
        .all(state.db.as_ref())
        .await?;
    Ok(Json(rows))
}
