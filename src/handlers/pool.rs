//! Company-facing pool endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::models::entry::EntryResponse;
use crate::models::error::Result;
use crate::services::assignment::AssignmentService;
use crate::services::lifecycle::LifecycleService;
use crate::services::pool;

#[derive(Debug, Deserialize)]
pub struct PoolQuery {
    pub company_id: String,
}

/// One pool row as shown to a company browsing unclaimed entries
#[derive(Debug, Serialize)]
pub struct PoolEntry {
    pub id: i32,
    pub vehicle_class: String,
    pub country: String,
    pub state: String,
    pub payment_method: String,
    pub created_at: String,
    pub age_secs: i64,
}

/// GET /api/pool?company_id= - pending entries visible to this company's tier
pub async fn get_pool(
    State(state): State<AppState>,
    Query(query): Query<PoolQuery>,
) -> Result<Json<Vec<PoolEntry>>> {
    let company = state.accounts.get_company(&query.company_id).await?;
    let now = Utc::now();

    let rows = pool::visible_entries(&state.db, &company.state, company.priority, now).await?;

    let pool_entries = rows
        .into_iter()
        .map(|entry| PoolEntry {
            id: entry.id,
            vehicle_class: entry.vehicle_class,
            country: entry.country,
            state: entry.state,
            payment_method: entry.payment_method,
            age_secs: (now - entry.created_at.with_timezone(&Utc)).num_seconds(),
            created_at: entry.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(pool_entries))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub company_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub entry: EntryResponse,
    /// How many riders were offered the entry; zero means nobody is
    /// currently eligible and the claim will time out back into the pool
    pub riders_offered: usize,
}

/// POST /api/pool/{id}/claim - claim an entry and fan offers out to riders
pub async fn claim_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i32>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>> {
    let (entry, order_models) = LifecycleService::from_state(&state)
        .claim_entry(entry_id, &payload.company_id)
        .await?;

    let riders_offered = AssignmentService::from_state(&state)
        .offer_entry(&entry)
        .await?;

    if riders_offered == 0 {
        tracing::warn!(entry_id, company_id = %payload.company_id, "No eligible riders for claim");
    }

    Ok(Json(ClaimResponse {
        entry: EntryResponse::from_models(entry, order_models),
        riders_offered,
    }))
}
