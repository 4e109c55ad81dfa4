//! Pool sweeper job
//!
//! Periodically reclaims stalled claims (companyAccepted for too long with no
//! rider) back into the pool and purges entries whose payment was never
//! confirmed. Timeouts are enforced only here, never by per-request timers.
//! Supports graceful shutdown via SIGTERM/SIGINT signals.

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use std::env;
use tokio::time::{Duration as TokioDuration, interval};
use tracing::{error, info, warn};

use crate::entities::{entries, orders, prelude::*, rider_assignment_requests, transactions};
use crate::handlers::dispatch_ws::DispatchBroadcaster;
use crate::models::assignment::AssignmentStatus;
use crate::models::dispatch_event::{Audience, DispatchEvent, DispatchEventKind};
use crate::models::entry::EntryStatus;
use crate::models::error::DispatchError;

/// Default sweep interval in seconds
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Claims older than this with no rider go back to the pool
const DEFAULT_RECLAIM_AFTER_SECS: i64 = 600;

/// Entries never paid for are purged after this long
const DEFAULT_PURGE_AFTER_SECS: i64 = 86_400;

/// Environment variable for the sweep interval
const ENV_SWEEP_INTERVAL: &str = "POOL_SWEEP_INTERVAL_SECS";

/// Environment variable for the reclaim threshold
const ENV_RECLAIM_AFTER: &str = "POOL_RECLAIM_AFTER_SECS";

/// Environment variable for the unconfirmed-entry purge threshold
const ENV_PURGE_AFTER: &str = "ENTRY_PURGE_AFTER_SECS";

/// What one sweep cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub reclaimed: usize,
    pub purged: usize,
}

/// Start the pool sweeper job
///
/// Spawns a background task that every interval:
/// 1. Resets stalled `companyAccepted` entries (no rider after the threshold)
///    to `pending` with the company cleared, so other companies can claim them
/// 2. Deletes `request` entries (payment never confirmed) past the purge age,
///    along with their orders
///
/// A failed cycle is logged and retried on the next interval.
pub async fn start_pool_sweeper_job(db: std::sync::Arc<DatabaseConnection>, events: DispatchBroadcaster) {
    tokio::spawn(async move {
        let sweep_interval_secs: u64 = env::var(ENV_SWEEP_INTERVAL)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let reclaim_after_secs: i64 = env::var(ENV_RECLAIM_AFTER)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECLAIM_AFTER_SECS);
        let purge_after_secs: i64 = env::var(ENV_PURGE_AFTER)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PURGE_AFTER_SECS);

        info!(
            sweep_interval_secs,
            reclaim_after_secs, purge_after_secs, "Pool sweeper job started"
        );

        let mut interval = interval(TokioDuration::from_secs(sweep_interval_secs));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping pool sweeper gracefully");
                    break;
                }
                _ = interval.tick() => {
                    match run_sweep(&db, &events, reclaim_after_secs, purge_after_secs).await {
                        Ok(stats) if stats.reclaimed > 0 || stats.purged > 0 => {
                            info!(
                                reclaimed = stats.reclaimed,
                                purged = stats.purged,
                                "Pool sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "Pool sweep failed");
                            // Continue - next interval will retry
                        }
                    }
                }
            }
        }

        info!("Pool sweeper job stopped");
    });
}

/// One sweep cycle. Safe to run concurrently with normal traffic: every write
/// re-checks the snapshot condition, so an entry that moved on since the read
/// is left alone. Running it twice back-to-back changes nothing the second
/// time.
pub async fn run_sweep(
    db: &DatabaseConnection,
    events: &DispatchBroadcaster,
    reclaim_after_secs: i64,
    purge_after_secs: i64,
) -> Result<SweepStats, DispatchError> {
    let mut stats = SweepStats::default();
    stats.reclaimed = reclaim_stalled_claims(db, events, reclaim_after_secs).await?;
    stats.purged = purge_unconfirmed_entries(db, purge_after_secs).await?;
    Ok(stats)
}

async fn reclaim_stalled_claims(
    db: &DatabaseConnection,
    events: &DispatchBroadcaster,
    reclaim_after_secs: i64,
) -> Result<usize, DispatchError> {
    let cutoff = Utc::now() - Duration::seconds(reclaim_after_secs);

    let stalled = Entries::find()
        .filter(entries::Column::Status.eq(EntryStatus::CompanyAccepted.to_string()))
        .filter(entries::Column::RiderId.is_null())
        .filter(entries::Column::CompanyAcceptedAt.lte(cutoff))
        .all(db)
        .await?;

    let mut reclaimed = 0;
    for entry in stalled {
        let entry_id = entry.id;
        let result = db
            .transaction::<_, bool, DispatchError>(move |txn| {
                Box::pin(async move {
                    // Re-check at write time: the entry may have gained a rider
                    // or moved on since the snapshot was read
                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::Pending.to_string()),
                        )
                        .col_expr(
                            entries::Column::CompanyId,
                            Expr::value(Option::<String>::None),
                        )
                        .col_expr(
                            entries::Column::CompanyAcceptedAt,
                            Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
                        )
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(
                            entries::Column::Status
                                .eq(EntryStatus::CompanyAccepted.to_string()),
                        )
                        .filter(entries::Column::RiderId.is_null())
                        .filter(entries::Column::CompanyAcceptedAt.lte(cutoff))
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Ok(false);
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::Pending.to_string()),
                        )
                        .col_expr(
                            orders::Column::CompanyId,
                            Expr::value(Option::<String>::None),
                        )
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    Transactions::update_many()
                        .col_expr(
                            transactions::Column::CompanyId,
                            Expr::value(Option::<String>::None),
                        )
                        .filter(transactions::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    // Offers from the stalled claim are dead
                    RiderAssignmentRequests::update_many()
                        .col_expr(
                            rider_assignment_requests::Column::Status,
                            Expr::value(AssignmentStatus::Declined.to_string()),
                        )
                        .filter(rider_assignment_requests::Column::EntryId.eq(entry_id))
                        .filter(
                            rider_assignment_requests::Column::Status
                                .eq(AssignmentStatus::Pending.to_string()),
                        )
                        .exec(txn)
                        .await?;

                    Ok(true)
                })
            })
            .await?;

        if result {
            warn!(entry_id, "Stalled claim reclaimed into the pool");
            events.publish(DispatchEvent::new(
                DispatchEventKind::NewEntry,
                Audience::Region {
                    country: entry.country.clone(),
                    state: entry.state.clone(),
                },
                entry.id,
                EntryStatus::Pending.to_string(),
            ));
            events.publish(DispatchEvent::new(
                DispatchEventKind::PoolUpdate,
                Audience::Admin,
                entry.id,
                EntryStatus::Pending.to_string(),
            ));
            reclaimed += 1;
        }
    }

    Ok(reclaimed)
}

async fn purge_unconfirmed_entries(
    db: &DatabaseConnection,
    purge_after_secs: i64,
) -> Result<usize, DispatchError> {
    let cutoff = Utc::now() - Duration::seconds(purge_after_secs);

    let expired = Entries::find()
        .filter(entries::Column::Status.eq(EntryStatus::Request.to_string()))
        .filter(entries::Column::CreatedAt.lte(cutoff))
        .all(db)
        .await?;

    let mut purged = 0;
    for entry in expired {
        let entry_id = entry.id;
        let deleted = db
            .transaction::<_, bool, DispatchError>(move |txn| {
                Box::pin(async move {
                    Orders::delete_many()
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    // The status filter is the write-time guard: a payment
                    // confirmed after the snapshot leaves the entry alone
                    let result = Entries::delete_many()
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(entries::Column::Status.eq(EntryStatus::Request.to_string()))
                        .exec(txn)
                        .await?;

                    if result.rows_affected != 1 {
                        return Err(DispatchError::Conflict(
                            "entry left the request state during purge".to_string(),
                        ));
                    }
                    Ok(true)
                })
            })
            .await
            .map_err(DispatchError::from);

        match deleted {
            Ok(true) => {
                info!(entry_id, "Purged never-confirmed entry");
                purged += 1;
            }
            Ok(false) => {}
            Err(DispatchError::Conflict(_)) => {
                // Raced with a payment confirmation; the rollback restored the
                // orders and the entry lives on
            }
            Err(e) => return Err(e),
        }
    }

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[test]
    fn test_default_thresholds() {
        assert_eq!(DEFAULT_SWEEP_INTERVAL_SECS, 60);
        assert_eq!(DEFAULT_RECLAIM_AFTER_SECS, 600);
        assert_eq!(DEFAULT_PURGE_AFTER_SECS, 86_400);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(ENV_SWEEP_INTERVAL, "POOL_SWEEP_INTERVAL_SECS");
        assert_eq!(ENV_RECLAIM_AFTER, "POOL_RECLAIM_AFTER_SECS");
        assert_eq!(ENV_PURGE_AFTER, "ENTRY_PURGE_AFTER_SECS");
    }

    fn entry(id: i32, status: &str, created_secs_ago: i64) -> entries::Model {
        entries::Model {
            id,
            shipper_id: "shipper-1".to_string(),
            status: status.to_string(),
            payment_method: "card".to_string(),
            vehicle_class: "bike".to_string(),
            recipient_name: "Ada Obi".to_string(),
            recipient_phone: "+2348012345678".to_string(),
            country: "NG".to_string(),
            state: "Lagos".to_string(),
            otp_code: None,
            otp_attempts: None,
            company_id: None,
            rider_id: None,
            transaction_id: None,
            created_at: (Utc::now() - Duration::seconds(created_secs_ago)).into(),
            company_accepted_at: None,
            rider_accepted_at: None,
            cancelled_at: None,
        }
    }

    fn stalled_claim(id: i32, accepted_secs_ago: i64) -> entries::Model {
        let mut e = entry(id, "companyAccepted", accepted_secs_ago + 60);
        e.company_id = Some("company-1".to_string());
        e.company_accepted_at = Some((Utc::now() - Duration::seconds(accepted_secs_ago)).into());
        e
    }

    fn exec_ok(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_reclaim_returns_entry_to_pool_and_second_sweep_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // first pass: one stalled claim, nothing to purge
            .append_query_results([vec![stalled_claim(1, 700)]])
            .append_query_results([Vec::<entries::Model>::new()])
            // second pass: both snapshots empty
            .append_query_results([Vec::<entries::Model>::new()])
            .append_query_results([Vec::<entries::Model>::new()])
            // entry reset, orders reset, transaction cleared, offers declined
            .append_exec_results([exec_ok(1), exec_ok(1), exec_ok(1), exec_ok(2)])
            .into_connection();

        let events = DispatchBroadcaster::new();
        let mut rx = events.subscribe();

        let first = run_sweep(&db, &events, 600, 86_400).await.unwrap();
        assert_eq!(
            first,
            SweepStats {
                reclaimed: 1,
                purged: 0
            }
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, DispatchEventKind::NewEntry);
        assert_eq!(event.entry_id, 1);
        assert_eq!(event.status, "pending");

        let second = run_sweep(&db, &events, 600, 86_400).await.unwrap();
        assert_eq!(second, SweepStats::default());
    }

    #[tokio::test]
    async fn test_reclaim_skips_entry_that_moved_on_after_snapshot() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stalled_claim(1, 700)]])
            .append_query_results([Vec::<entries::Model>::new()])
            // the write-time re-check matched nothing (a rider accepted meanwhile)
            .append_exec_results([exec_ok(0)])
            .into_connection();

        let events = DispatchBroadcaster::new();
        let mut rx = events.subscribe();

        let stats = run_sweep(&db, &events, 600, 86_400).await.unwrap();
        assert_eq!(stats, SweepStats::default());
        assert!(rx.try_recv().is_err(), "no event for an entry left alone");
    }

    #[tokio::test]
    async fn test_purge_deletes_never_confirmed_entry_with_orders() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<entries::Model>::new()])
            .append_query_results([vec![entry(2, "request", 90_000)]])
            // orders deleted, then the guarded entry delete
            .append_exec_results([exec_ok(2), exec_ok(1)])
            .into_connection();

        let events = DispatchBroadcaster::new();

        let stats = run_sweep(&db, &events, 600, 86_400).await.unwrap();
        assert_eq!(
            stats,
            SweepStats {
                reclaimed: 0,
                purged: 1
            }
        );
    }
}
