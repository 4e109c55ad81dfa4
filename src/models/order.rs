//! Order response type
//!
//! Orders reuse `EntryStatus` strings for their own status column; during the
//! shared prefix (up to pickedup) an order's status mirrors its entry, after
//! which each parcel runs its own delivery leg.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i32,
    pub entry_id: i32,
    pub status: String,
    pub company_id: Option<String>,
    pub rider_id: Option<String>,
    pub pickup_address: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub cost: String,
    pub weight: String,
    pub created_at: String,
    pub delivered_at: Option<String>,
}

impl From<crate::entities::orders::Model> for OrderResponse {
    fn from(model: crate::entities::orders::Model) -> Self {
        Self {
            id: model.id,
            entry_id: model.entry_id,
            status: model.status,
            company_id: model.company_id,
            rider_id: model.rider_id,
            pickup_address: model.pickup_address,
            pickup_lat: model.pickup_lat,
            pickup_lng: model.pickup_lng,
            delivery_address: model.delivery_address,
            delivery_lat: model.delivery_lat,
            delivery_lng: model.delivery_lng,
            recipient_name: model.recipient_name,
            recipient_phone: model.recipient_phone,
            cost: model.cost.to_string(),
            weight: model.weight.to_string(),
            created_at: model.created_at.to_rfc3339(),
            delivered_at: model.delivered_at.map(|t| t.to_rfc3339()),
        }
    }
}
