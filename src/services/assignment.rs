//! Rider assignment coordinator
//!
//! When a company claims an entry the coordinator fans one offer out to every
//! eligible online rider; the first accept wins through a compare-and-swap on
//! both the request row and the entry. Losing riders' requests are declined in
//! the same transaction so none are left dangling.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};

use crate::entities::{entries, orders, prelude::*, rider_assignment_requests, transactions};
use crate::handlers::dispatch_ws::DispatchBroadcaster;
use crate::models::assignment::AssignmentStatus;
use crate::models::dispatch_event::{Audience, DispatchEvent, DispatchEventKind};
use crate::models::entry::EntryStatus;
use crate::models::error::{DispatchError, Result};
use crate::services::accounts::AccountService;
use crate::services::lifecycle::write_trip_events;
use crate::AppState;

/// A rider with this many open (undelivered, uncancelled) orders gets no offer
pub const MAX_OPEN_ORDERS: u64 = 10;

pub struct AssignmentService {
    db: Arc<DatabaseConnection>,
    accounts: AccountService,
    events: DispatchBroadcaster,
}

impl AssignmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        accounts: AccountService,
        events: DispatchBroadcaster,
    ) -> Self {
        Self {
            db,
            accounts,
            events,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.accounts.clone(),
            state.events.clone(),
        )
    }

    /// Offer a freshly claimed entry to every eligible rider of its company.
    /// Returns how many riders were offered; zero means the caller must be
    /// told there is nobody to ride this out right now.
    pub async fn offer_entry(&self, entry: &entries::Model) -> Result<usize> {
        let company_id = entry.company_id.as_deref().ok_or_else(|| {
            DispatchError::Conflict("entry has no claiming company".to_string())
        })?;

        let riders = self.accounts.company_riders(company_id).await?;
        let mut offered = 0;
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        for rider in riders {
            if !rider.is_available(&entry.vehicle_class) {
                continue;
            }

            let open_orders = Orders::find()
                .filter(orders::Column::RiderId.eq(rider.id.clone()))
                .filter(
                    orders::Column::Status
                        .ne(EntryStatus::Delivered.to_string())
                        .and(orders::Column::Status.ne(EntryStatus::Cancelled.to_string())),
                )
                .count(self.db.as_ref())
                .await?;
            if open_orders >= MAX_OPEN_ORDERS {
                tracing::debug!(rider_id = %rider.id, open_orders, "Rider at capacity, skipping");
                continue;
            }

            rider_assignment_requests::ActiveModel {
                entry_id: Set(entry.id),
                company_id: Set(company_id.to_string()),
                rider_id: Set(rider.id.clone()),
                status: Set(AssignmentStatus::Pending.to_string()),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(self.db.as_ref())
            .await?;

            self.events.publish(DispatchEvent::new(
                DispatchEventKind::AssignEntry,
                Audience::Rider {
                    rider_id: rider.id.clone(),
                },
                entry.id,
                entry.status.clone(),
            ));
            offered += 1;
        }

        tracing::info!(entry_id = entry.id, offered, "Entry offered to riders");
        Ok(offered)
    }

    /// First accept wins: flips this rider's pending request to accepted and
    /// the entry to driverAccepted in one transaction. A concurrent accept by
    /// another rider leaves exactly one winner and one conflict error.
    pub async fn accept(&self, request_id: i32, rider_id: &str) -> Result<entries::Model> {
        let request = RiderAssignmentRequests::find_by_id(request_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(DispatchError::NotFound("assignment request"))?;

        if request.rider_id != rider_id {
            return Err(DispatchError::Conflict(
                "assignment request belongs to another rider".to_string(),
            ));
        }

        let entry_id = request.entry_id;
        let rider_id_owned = rider_id.to_string();
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                let rider_id = rider_id_owned.clone();
                Box::pin(async move {
                    let updated = RiderAssignmentRequests::update_many()
                        .col_expr(
                            rider_assignment_requests::Column::Status,
                            Expr::value(AssignmentStatus::Accepted.to_string()),
                        )
                        .col_expr(
                            rider_assignment_requests::Column::ResolvedAt,
                            Expr::value(Some(now)),
                        )
                        .filter(rider_assignment_requests::Column::Id.eq(request_id))
                        .filter(
                            rider_assignment_requests::Column::Status
                                .eq(AssignmentStatus::Pending.to_string()),
                        )
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(
                            "assignment request is no longer pending".to_string(),
                        ));
                    }

                    // The entry must still be claimable by a rider and carry a
                    // settlement record
                    let tx_count = Transactions::find()
                        .filter(transactions::Column::EntryId.eq(entry_id))
                        .count(txn)
                        .await?;
                    if tx_count == 0 {
                        return Err(DispatchError::Conflict(
                            "entry has no payment transaction".to_string(),
                        ));
                    }

                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::DriverAccepted.to_string()),
                        )
                        .col_expr(entries::Column::RiderId, Expr::value(Some(rider_id.clone())))
                        .col_expr(entries::Column::RiderAcceptedAt, Expr::value(Some(now)))
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(
                            entries::Column::Status.eq(EntryStatus::CompanyAccepted.to_string()),
                        )
                        .filter(entries::Column::RiderId.is_null())
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(
                            "entry already accepted by another rider".to_string(),
                        ));
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::DriverAccepted.to_string()),
                        )
                        .col_expr(orders::Column::RiderId, Expr::value(Some(rider_id.clone())))
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    Transactions::update_many()
                        .col_expr(
                            transactions::Column::RiderId,
                            Expr::value(Some(rider_id.clone())),
                        )
                        .filter(transactions::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    // Close out the losing offers instead of leaving them
                    // pending forever
                    RiderAssignmentRequests::update_many()
                        .col_expr(
                            rider_assignment_requests::Column::Status,
                            Expr::value(AssignmentStatus::Declined.to_string()),
                        )
                        .col_expr(
                            rider_assignment_requests::Column::ResolvedAt,
                            Expr::value(Some(now)),
                        )
                        .filter(rider_assignment_requests::Column::EntryId.eq(entry_id))
                        .filter(
                            rider_assignment_requests::Column::Status
                                .eq(AssignmentStatus::Pending.to_string()),
                        )
                        .exec(txn)
                        .await?;

                    write_trip_events(
                        txn,
                        entry_id,
                        EntryStatus::DriverAccepted,
                        Some(rider_id),
                        None,
                        None,
                    )
                    .await?;
                    Ok(())
                })
            })
            .await?;

        let entry = Entries::find_by_id(entry_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(DispatchError::NotFound("entry"))?;

        self.events.publish(DispatchEvent::new(
            DispatchEventKind::EntryAccepted,
            Audience::Admin,
            entry.id,
            entry.status.clone(),
        ));
        self.events.publish(DispatchEvent::new(
            DispatchEventKind::PoolUpdate,
            Audience::Admin,
            entry.id,
            entry.status.clone(),
        ));

        tracing::info!(entry_id, rider_id, "Rider accepted entry");
        Ok(entry)
    }

    /// Decline affects only this rider's own request; the entry is untouched
    pub async fn decline(&self, request_id: i32, rider_id: &str) -> Result<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let updated = RiderAssignmentRequests::update_many()
            .col_expr(
                rider_assignment_requests::Column::Status,
                Expr::value(AssignmentStatus::Declined.to_string()),
            )
            .col_expr(
                rider_assignment_requests::Column::ResolvedAt,
                Expr::value(Some(now)),
            )
            .filter(rider_assignment_requests::Column::Id.eq(request_id))
            .filter(rider_assignment_requests::Column::RiderId.eq(rider_id))
            .filter(
                rider_assignment_requests::Column::Status
                    .eq(AssignmentStatus::Pending.to_string()),
            )
            .exec(self.db.as_ref())
            .await?;

        if updated.rows_affected != 1 {
            return Err(DispatchError::NotFound("pending assignment request"));
        }
        Ok(())
    }

    /// A rider's open offers, oldest first
    pub async fn pending_for_rider(
        &self,
        rider_id: &str,
    ) -> Result<Vec<rider_assignment_requests::Model>> {
        use sea_orm::QueryOrder;

        let rows = RiderAssignmentRequests::find()
            .filter(rider_assignment_requests::Column::RiderId.eq(rider_id))
            .filter(
                rider_assignment_requests::Column::Status
                    .eq(AssignmentStatus::Pending.to_string()),
            )
            .order_by_asc(rider_assignment_requests::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }
}
