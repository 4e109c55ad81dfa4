//! SeaORM Entity for transactions (payment/settlement record, one per entry)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub entry_id: i32,
    pub payment_method: String,
    pub amount: Decimal,
    /// pending / approved / declined
    pub status: String,
    /// Payment-gateway reference for the charge
    pub reference: String,
    pub company_id: Option<String>,
    pub rider_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub approved_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
