//! SeaORM Entity for orders (one parcel within an entry)
//!
//! Orders share the entry's status up to pickedup, then each parcel runs its
//! own enrouteToDelivery → arrivedAtDelivery → delivered leg.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub entry_id: i32,
    pub status: String,
    /// Delivery OTP, present only between arrivedAtDelivery and delivered
    pub otp_code: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub otp_attempts: Option<Json>,
    pub company_id: Option<String>,
    pub rider_id: Option<String>,
    pub transaction_id: Option<i32>,
    pub pickup_address: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub delivery_address: String,
    pub delivery_lat: f64,
    pub delivery_lng: f64,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub cost: Decimal,
    pub weight: Decimal,
    pub created_at: DateTimeWithTimeZone,
    pub delivered_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::entries::Entity",
        from = "Column::EntryId",
        to = "super::entries::Column::Id"
    )]
    Entry,
}

impl Related<super::entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
