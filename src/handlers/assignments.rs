//! Rider-facing assignment endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::models::assignment::AssignmentRequestResponse;
use crate::models::error::Result;
use crate::services::assignment::AssignmentService;

#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    pub rider_id: String,
}

/// GET /api/assignments?rider_id= - this rider's open offers
pub async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<AssignmentsQuery>,
) -> Result<Json<Vec<AssignmentRequestResponse>>> {
    let rows = AssignmentService::from_state(&state)
        .pending_for_rider(&query.rider_id)
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ResolveAssignmentRequest {
    pub rider_id: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub entry_id: i32,
    pub status: String,
}

/// POST /api/assignments/{id}/accept - first accept wins the entry
pub async fn accept_assignment(
    State(state): State<AppState>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ResolveAssignmentRequest>,
) -> Result<Json<AcceptResponse>> {
    let entry = AssignmentService::from_state(&state)
        .accept(request_id, &payload.rider_id)
        .await?;
    Ok(Json(AcceptResponse {
        entry_id: entry.id,
        status: entry.status,
    }))
}

/// POST /api/assignments/{id}/decline - close out this rider's own offer
pub async fn decline_assignment(
    State(state): State<AppState>,
    Path(request_id): Path<i32>,
    Json(payload): Json<ResolveAssignmentRequest>,
) -> Result<Json<serde_json::Value>> {
    AssignmentService::from_state(&state)
        .decline(request_id, &payload.rider_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
