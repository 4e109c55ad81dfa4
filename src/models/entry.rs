//! Entry status enum and entry-facing request/response types
//!
//! Status progresses: request → pending → companyAccepted → driverAccepted
//!                    → enrouteToPickup → arrivedAtPickup → pickedup
//!                    → enrouteToDelivery → arrivedAtDelivery → delivered → completed
//! `cancelled` is reachable from any pre-delivered state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::transaction::PaymentMethod;

/// Lifecycle states for an entry (and, up to pickedup, its orders)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    #[serde(rename = "request")]
    Request,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "companyAccepted")]
    CompanyAccepted,
    #[serde(rename = "driverAccepted")]
    DriverAccepted,
    #[serde(rename = "enrouteToPickup")]
    EnrouteToPickup,
    #[serde(rename = "arrivedAtPickup")]
    ArrivedAtPickup,
    #[serde(rename = "pickedup")]
    Pickedup,
    #[serde(rename = "enrouteToDelivery")]
    EnrouteToDelivery,
    #[serde(rename = "arrivedAtDelivery")]
    ArrivedAtDelivery,
    #[serde(rename = "delivered")]
    Delivered,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl EntryStatus {
    /// Position in the forward progression; `Cancelled` sorts last
    pub fn rank(&self) -> u8 {
        match self {
            EntryStatus::Request => 0,
            EntryStatus::Pending => 1,
            EntryStatus::CompanyAccepted => 2,
            EntryStatus::DriverAccepted => 3,
            EntryStatus::EnrouteToPickup => 4,
            EntryStatus::ArrivedAtPickup => 5,
            EntryStatus::Pickedup => 6,
            EntryStatus::EnrouteToDelivery => 7,
            EntryStatus::ArrivedAtDelivery => 8,
            EntryStatus::Delivered => 9,
            EntryStatus::Completed => 10,
            EntryStatus::Cancelled => 11,
        }
    }

    /// Whether `next` is a legal single forward step from `self`
    pub fn can_advance_to(&self, next: EntryStatus) -> bool {
        if next == EntryStatus::Cancelled {
            return self.can_cancel();
        }
        next.rank() == self.rank() + 1 && *self != EntryStatus::Cancelled
    }

    /// Cancellation is allowed from any state before delivered
    pub fn can_cancel(&self) -> bool {
        self.rank() < EntryStatus::Delivered.rank()
    }

    /// States in which the entry has no assigned rider yet
    pub fn precedes_rider_assignment(&self) -> bool {
        self.rank() < EntryStatus::DriverAccepted.rank()
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryStatus::Request => "request",
            EntryStatus::Pending => "pending",
            EntryStatus::CompanyAccepted => "companyAccepted",
            EntryStatus::DriverAccepted => "driverAccepted",
            EntryStatus::EnrouteToPickup => "enrouteToPickup",
            EntryStatus::ArrivedAtPickup => "arrivedAtPickup",
            EntryStatus::Pickedup => "pickedup",
            EntryStatus::EnrouteToDelivery => "enrouteToDelivery",
            EntryStatus::ArrivedAtDelivery => "arrivedAtDelivery",
            EntryStatus::Delivered => "delivered",
            EntryStatus::Completed => "completed",
            EntryStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(EntryStatus::Request),
            "pending" => Ok(EntryStatus::Pending),
            "companyAccepted" => Ok(EntryStatus::CompanyAccepted),
            "driverAccepted" => Ok(EntryStatus::DriverAccepted),
            "enrouteToPickup" => Ok(EntryStatus::EnrouteToPickup),
            "arrivedAtPickup" => Ok(EntryStatus::ArrivedAtPickup),
            "pickedup" => Ok(EntryStatus::Pickedup),
            "enrouteToDelivery" => Ok(EntryStatus::EnrouteToDelivery),
            "arrivedAtDelivery" => Ok(EntryStatus::ArrivedAtDelivery),
            "delivered" => Ok(EntryStatus::Delivered),
            "completed" => Ok(EntryStatus::Completed),
            "cancelled" => Ok(EntryStatus::Cancelled),
            _ => Err(format!("Unknown entry status: {}", s)),
        }
    }
}

/// One parcel in an entry-creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
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
}

/// POST /api/entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryRequest {
    pub shipper_id: String,
    pub payment_method: PaymentMethod,
    pub vehicle_class: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub country: String,
    pub state: String,
    pub orders: Vec<CreateOrderRequest>,
}

/// POST /api/entries/{id}/payment - charge outcome reported by the payment service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcomeRequest {
    pub amount: Decimal,
    pub approved: bool,
    pub reference: String,
}

/// Entry with its order breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResponse {
    pub id: i32,
    pub shipper_id: String,
    pub status: String,
    pub payment_method: String,
    pub vehicle_class: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub country: String,
    pub state: String,
    pub company_id: Option<String>,
    pub rider_id: Option<String>,
    pub transaction_id: Option<i32>,
    pub created_at: String,
    pub company_accepted_at: Option<String>,
    pub rider_accepted_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub orders: Vec<crate::models::order::OrderResponse>,
}

impl EntryResponse {
    pub fn from_models(
        entry: crate::entities::entries::Model,
        orders: Vec<crate::entities::orders::Model>,
    ) -> Self {
        Self {
            id: entry.id,
            shipper_id: entry.shipper_id,
            status: entry.status,
            payment_method: entry.payment_method,
            vehicle_class: entry.vehicle_class,
            recipient_name: entry.recipient_name,
            recipient_phone: entry.recipient_phone,
            country: entry.country,
            state: entry.state,
            company_id: entry.company_id,
            rider_id: entry.rider_id,
            transaction_id: entry.transaction_id,
            created_at: entry.created_at.to_rfc3339(),
            company_accepted_at: entry.company_accepted_at.map(|t| t.to_rfc3339()),
            rider_accepted_at: entry.rider_accepted_at.map(|t| t.to_rfc3339()),
            cancelled_at: entry.cancelled_at.map(|t| t.to_rfc3339()),
            orders: orders.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        for s in [
            "request",
            "pending",
            "companyAccepted",
            "driverAccepted",
            "enrouteToPickup",
            "arrivedAtPickup",
            "pickedup",
            "enrouteToDelivery",
            "arrivedAtDelivery",
            "delivered",
            "completed",
            "cancelled",
        ] {
            assert_eq!(EntryStatus::from_str(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_forward_steps_only() {
        assert!(EntryStatus::Pending.can_advance_to(EntryStatus::CompanyAccepted));
        assert!(EntryStatus::ArrivedAtPickup.can_advance_to(EntryStatus::Pickedup));
        assert!(!EntryStatus::Pending.can_advance_to(EntryStatus::DriverAccepted));
        assert!(!EntryStatus::Pickedup.can_advance_to(EntryStatus::ArrivedAtPickup));
        assert!(!EntryStatus::Cancelled.can_advance_to(EntryStatus::Pending));
    }

    #[test]
    fn test_cancel_window_closes_at_delivered() {
        assert!(EntryStatus::Request.can_cancel());
        assert!(EntryStatus::ArrivedAtDelivery.can_cancel());
        assert!(!EntryStatus::Delivered.can_cancel());
        assert!(!EntryStatus::Completed.can_cancel());
    }
}
