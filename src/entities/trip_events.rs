//! SeaORM Entity for trip_events (append-only transition audit log)
//!
//! Rows are written once per order per transition and never mutated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trip_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Transition name (matches `models::entry::EntryStatus` strings)
    pub event_type: String,
    pub rider_id: Option<String>,
    pub entry_id: i32,
    pub order_id: i32,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Opaque provider-specific side-channel, outside the core invariants
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<Json>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
