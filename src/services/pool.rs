//! Pool visibility: which pending entries a company may see, and when
//!
//! Fairness tiers delay visibility by company priority: premium (2) sees an
//! entry immediately, mid tier (1) after 5 minutes, base tier (0) after 30.
//! The query is the single authority on visibility; events only hint.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{entries, prelude::*};
use crate::models::entry::EntryStatus;
use crate::models::error::Result;

/// Visibility delay for a company priority tier (0 = lowest, 2 = highest)
pub fn tier_delay(priority: u8) -> Duration {
    match priority {
        2 => Duration::zero(),
        1 => Duration::minutes(5),
        _ => Duration::minutes(30),
    }
}

/// Whether an entry created at `created_at` is visible to `priority` at `now`
pub fn is_visible(created_at: DateTime<Utc>, priority: u8, now: DateTime<Utc>) -> bool {
    now - created_at >= tier_delay(priority)
}

/// Unclaimed pending entries in `state` old enough for `priority`, oldest first
pub async fn visible_entries(
    db: &DatabaseConnection,
    state: &str,
    priority: u8,
    now: DateTime<Utc>,
) -> Result<Vec<entries::Model>> {
    let cutoff = now - tier_delay(priority);

    let rows = Entries::find()
        .filter(entries::Column::Status.eq(EntryStatus::Pending.to_string()))
        .filter(entries::Column::CompanyId.is_null())
        .filter(entries::Column::State.eq(state))
        .filter(entries::Column::CreatedAt.lte(cutoff))
        .order_by_asc(entries::Column::CreatedAt)
        .all(db)
        .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_delays() {
        assert_eq!(tier_delay(2), Duration::zero());
        assert_eq!(tier_delay(1), Duration::minutes(5));
        assert_eq!(tier_delay(0), Duration::minutes(30));
        // Unknown tiers fall back to the most delayed bucket
        assert_eq!(tier_delay(7), Duration::minutes(30));
    }

    #[test]
    fn test_visibility_boundaries() {
        let created = Utc::now();

        // Priority 2 sees the entry at creation time
        assert!(is_visible(created, 2, created));

        // Priority 1 only at T+5m, never earlier
        assert!(!is_visible(created, 1, created));
        assert!(!is_visible(created, 1, created + Duration::seconds(299)));
        assert!(is_visible(created, 1, created + Duration::minutes(5)));

        // Priority 0 only at T+30m
        assert!(!is_visible(created, 0, created + Duration::minutes(29)));
        assert!(is_visible(created, 0, created + Duration::minutes(30)));
    }
}
