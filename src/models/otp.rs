//! OTP attempt records and verification DTOs
//!
//! Attempt lists persist as a JSON column on entries (pickup) and orders
//! (delivery) and are append-only; lockout decisions are computed from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One failed verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpAttempt {
    /// The wrong code as submitted (never the stored code)
    pub code: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub at: DateTime<Utc>,
}

/// Rider-submitted verification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub rider_id: String,
    pub code: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Cash entries only: whether the rider confirmed collecting payment.
    /// `Some(false)` declines the cash collection and cancels the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_collected: Option<bool>,
}

/// Rider position update accompanying a plain transition (no code involved)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderProgressRequest {
    pub rider_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}
