//! SeaORM Entity for entries (delivery requests)
//!
//! An entry owns 1..N orders (parcels). Status values are the string forms of
//! `models::entry::EntryStatus`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Shipper (account-service user id) who created the request
    pub shipper_id: String,
    pub status: String,
    /// "card" or "cash"
    pub payment_method: String,
    /// Vehicle class required to carry the parcels (e.g. "bike", "van")
    pub vehicle_class: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    /// Geography key used for pool routing
    pub country: String,
    pub state: String,
    /// Pickup OTP, present only between arrivedAtPickup and pickedup
    pub otp_code: Option<String>,
    /// Append-only list of failed OTP attempts (`models::otp::OtpAttempt`)
    #[sea_orm(column_type = "JsonBinary")]
    pub otp_attempts: Option<Json>,
    pub company_id: Option<String>,
    pub rider_id: Option<String>,
    pub transaction_id: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
    pub company_accepted_at: Option<DateTimeWithTimeZone>,
    pub rider_accepted_at: Option<DateTimeWithTimeZone>,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
