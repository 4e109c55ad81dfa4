//! Assignment request status and account-service profile types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Declined,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::Pending => write!(f, "pending"),
            AssignmentStatus::Accepted => write!(f, "accepted"),
            AssignmentStatus::Declined => write!(f, "declined"),
        }
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AssignmentStatus::Pending),
            "accepted" => Ok(AssignmentStatus::Accepted),
            "declined" => Ok(AssignmentStatus::Declined),
            _ => Err(format!("Unknown assignment status: {}", s)),
        }
    }
}

/// Company profile as served by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: String,
    pub country: String,
    pub state: String,
    /// Subscription tier: 0 = lowest, 2 = highest
    pub priority: u8,
    /// Vehicle classes this company operates
    pub vehicle_classes: Vec<String>,
}

impl CompanyProfile {
    pub fn supports_vehicle(&self, class: &str) -> bool {
        self.vehicle_classes.iter().any(|v| v == class)
    }
}

/// Rider profile as served by the account service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderProfile {
    pub id: String,
    pub company_id: String,
    pub online: bool,
    pub active: bool,
    pub verified: bool,
    pub vehicle_class: String,
}

impl RiderProfile {
    /// Baseline eligibility before the open-order load check
    pub fn is_available(&self, vehicle_class: &str) -> bool {
        self.online && self.active && self.verified && self.vehicle_class == vehicle_class
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequestResponse {
    pub id: i32,
    pub entry_id: i32,
    pub company_id: String,
    pub rider_id: String,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl From<crate::entities::rider_assignment_requests::Model> for AssignmentRequestResponse {
    fn from(model: crate::entities::rider_assignment_requests::Model) -> Self {
        Self {
            id: model.id,
            entry_id: model.entry_id,
            company_id: model.company_id,
            rider_id: model.rider_id,
            status: model.status,
            created_at: model.created_at.to_rfc3339(),
            resolved_at: model.resolved_at.map(|t| t.to_rfc3339()),
        }
    }
}
