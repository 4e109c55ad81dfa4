//! Entry lifecycle state machine
//!
//! Every transition that touches more than one record (entry + orders, or
//! entry + transaction) runs inside a single database transaction, and every
//! state change is a conditional update (filter on the expected current state,
//! check `rows_affected`) so two workers can never both win the same
//! transition. Events are published only after the transaction has committed.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};

use crate::entities::{entries, orders, prelude::*, transactions, trip_events};
use crate::handlers::dispatch_ws::DispatchBroadcaster;
use crate::models::dispatch_event::{Audience, DispatchEvent, DispatchEventKind};
use crate::models::entry::{CreateEntryRequest, EntryResponse, EntryStatus, PaymentOutcomeRequest};
use crate::models::error::{DispatchError, Result};
use crate::models::otp::{RiderProgressRequest, VerifyOtpRequest};
use crate::models::transaction::{PaymentMethod, TransactionStatus};
use crate::services::{accounts::AccountService, notifications::NotificationService, otp, pool};
use crate::AppState;

pub struct LifecycleService {
    db: Arc<DatabaseConnection>,
    accounts: AccountService,
    notifier: NotificationService,
    events: DispatchBroadcaster,
}

impl LifecycleService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        accounts: AccountService,
        notifier: NotificationService,
        events: DispatchBroadcaster,
    ) -> Self {
        Self {
            db,
            accounts,
            notifier,
            events,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.accounts.clone(),
            state.notifier.clone(),
            state.events.clone(),
        )
    }

    /// Create an entry with its parcels, atomically, at `request` status
    pub async fn create_entry(&self, req: CreateEntryRequest) -> Result<EntryResponse> {
        if req.orders.is_empty() {
            return Err(DispatchError::Validation(
                "an entry requires at least one order".to_string(),
            ));
        }
        if req.vehicle_class.trim().is_empty() {
            return Err(DispatchError::Validation(
                "vehicle_class is required".to_string(),
            ));
        }

        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let status = EntryStatus::Request.to_string();

        let (entry, order_models) = self
            .db
            .transaction::<_, (entries::Model, Vec<orders::Model>), DispatchError>(move |txn| {
                Box::pin(async move {
                    let entry = entries::ActiveModel {
                        shipper_id: Set(req.shipper_id.clone()),
                        status: Set(status.clone()),
                        payment_method: Set(req.payment_method.to_string()),
                        vehicle_class: Set(req.vehicle_class.clone()),
                        recipient_name: Set(req.recipient_name.clone()),
                        recipient_phone: Set(req.recipient_phone.clone()),
                        country: Set(req.country.clone()),
                        state: Set(req.state.clone()),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    let mut order_models = Vec::with_capacity(req.orders.len());
                    for parcel in &req.orders {
                        let order = orders::ActiveModel {
                            entry_id: Set(entry.id),
                            status: Set(status.clone()),
                            pickup_address: Set(parcel.pickup_address.clone()),
                            pickup_lat: Set(parcel.pickup_lat),
                            pickup_lng: Set(parcel.pickup_lng),
                            delivery_address: Set(parcel.delivery_address.clone()),
                            delivery_lat: Set(parcel.delivery_lat),
                            delivery_lng: Set(parcel.delivery_lng),
                            recipient_name: Set(parcel.recipient_name.clone()),
                            recipient_phone: Set(parcel.recipient_phone.clone()),
                            cost: Set(parcel.cost),
                            weight: Set(parcel.weight),
                            created_at: Set(now),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                        order_models.push(order);
                    }

                    Ok((entry, order_models))
                })
            })
            .await?;

        tracing::info!(entry_id = entry.id, orders = order_models.len(), "Entry created");
        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Apply a payment outcome: approved moves `request → pending` together
    /// with the Transaction row; declined changes nothing.
    pub async fn confirm_payment(
        &self,
        entry_id: i32,
        outcome: PaymentOutcomeRequest,
    ) -> Result<EntryResponse> {
        let entry = self.load_entry(entry_id).await?;
        let status = parse_status(&entry.status)?;
        if status != EntryStatus::Request {
            return Err(DispatchError::Conflict(format!(
                "entry {} is not awaiting payment",
                entry_id
            )));
        }

        if !outcome.approved {
            return Err(DispatchError::Upstream("payment was declined".to_string()));
        }

        let method = entry
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(DispatchError::Validation)?;
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                Box::pin(async move {
                    // Cash settles at pickup; card is already charged
                    let (tx_status, approved_at) = match method {
                        PaymentMethod::Card => (TransactionStatus::Approved, Some(now)),
                        PaymentMethod::Cash => (TransactionStatus::Pending, None),
                    };

                    let tx = transactions::ActiveModel {
                        entry_id: Set(entry_id),
                        payment_method: Set(method.to_string()),
                        amount: Set(outcome.amount),
                        status: Set(tx_status.to_string()),
                        reference: Set(outcome.reference.clone()),
                        created_at: Set(now),
                        approved_at: Set(approved_at),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::Pending.to_string()),
                        )
                        .col_expr(entries::Column::TransactionId, Expr::value(Some(tx.id)))
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(entries::Column::Status.eq(EntryStatus::Request.to_string()))
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "entry {} left the request state concurrently",
                            entry_id
                        )));
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::Pending.to_string()),
                        )
                        .col_expr(orders::Column::TransactionId, Expr::value(Some(tx.id)))
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;

        self.events.publish(DispatchEvent::new(
            DispatchEventKind::NewEntry,
            Audience::Region {
                country: entry.country.clone(),
                state: entry.state.clone(),
            },
            entry.id,
            entry.status.clone(),
        ));
        self.publish_pool_update(&entry);

        tracing::info!(entry_id, "Payment confirmed, entry entered the pool");
        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Company claims a pending entry from the pool (compare-and-swap)
    pub async fn claim_entry(
        &self,
        entry_id: i32,
        company_id: &str,
    ) -> Result<(entries::Model, Vec<orders::Model>)> {
        let company = self.accounts.get_company(company_id).await?;
        let entry = self.load_entry(entry_id).await?;

        if !company.supports_vehicle(&entry.vehicle_class) {
            return Err(DispatchError::Validation(format!(
                "company does not operate vehicle class {}",
                entry.vehicle_class
            )));
        }

        // The same visibility rules the pool read enforces apply to the
        // claim itself: knowing an entry id early must not beat the tiers
        if entry.state != company.state {
            return Err(DispatchError::NotFound("entry"));
        }
        if !pool::is_visible(
            entry.created_at.with_timezone(&Utc),
            company.priority,
            Utc::now(),
        ) {
            return Err(DispatchError::Conflict(
                "entry is not yet visible to this company's tier".to_string(),
            ));
        }

        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let company_id = company.id.clone();

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                Box::pin(async move {
                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::CompanyAccepted.to_string()),
                        )
                        .col_expr(entries::Column::CompanyId, Expr::value(Some(company_id.clone())))
                        .col_expr(entries::Column::CompanyAcceptedAt, Expr::value(Some(now)))
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(entries::Column::Status.eq(EntryStatus::Pending.to_string()))
                        .filter(entries::Column::CompanyId.is_null())
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(
                            "entry already claimed by another company".to_string(),
                        ));
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::CompanyAccepted.to_string()),
                        )
                        .col_expr(orders::Column::CompanyId, Expr::value(Some(company_id.clone())))
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    Transactions::update_many()
                        .col_expr(
                            transactions::Column::CompanyId,
                            Expr::value(Some(company_id.clone())),
                        )
                        .filter(transactions::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    write_trip_events(
                        txn,
                        entry_id,
                        EntryStatus::CompanyAccepted,
                        None,
                        None,
                        None,
                    )
                    .await?;

                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;

        self.events.publish(DispatchEvent::new(
            DispatchEventKind::EntryAccepted,
            Audience::Admin,
            entry.id,
            entry.status.clone(),
        ));
        self.publish_pool_update(&entry);

        tracing::info!(entry_id, company_id = %company.id, "Entry claimed");
        Ok((entry, order_models))
    }

    /// Rider-driven shared-prefix transitions: enrouteToPickup, arrivedAtPickup.
    /// Arrival issues the pickup OTP and delivers it out-of-band.
    pub async fn rider_progress_entry(
        &self,
        entry_id: i32,
        target: EntryStatus,
        req: RiderProgressRequest,
    ) -> Result<EntryResponse> {
        debug_assert!(matches!(
            target,
            EntryStatus::EnrouteToPickup | EntryStatus::ArrivedAtPickup
        ));

        let entry = self.load_entry(entry_id).await?;
        self.require_assigned_rider(&entry, &req.rider_id).await?;

        let current = parse_status(&entry.status)?;
        if !current.can_advance_to(target) {
            return Err(DispatchError::Conflict(format!(
                "cannot move entry from {} to {}",
                current, target
            )));
        }

        let pickup_code = if target == EntryStatus::ArrivedAtPickup {
            Some(otp::generate_code())
        } else {
            None
        };
        let code_for_txn = pickup_code.clone();
        let rider_id = req.rider_id.clone();
        let (lat, lng) = (req.lat, req.lng);

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                let rider_id = rider_id.clone();
                let code = code_for_txn.clone();
                Box::pin(async move {
                    let mut update = Entries::update_many()
                        .col_expr(entries::Column::Status, Expr::value(target.to_string()))
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(entries::Column::Status.eq(current.to_string()));
                    if let Some(code) = &code {
                        update = update
                            .col_expr(entries::Column::OtpCode, Expr::value(Some(code.clone())))
                            .col_expr(
                                entries::Column::OtpAttempts,
                                Expr::value(Option::<serde_json::Value>::None),
                            );
                    }
                    let updated = update.exec(txn).await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "entry {} changed state concurrently",
                            entry_id
                        )));
                    }

                    // Orders mirror the entry through the shared prefix
                    Orders::update_many()
                        .col_expr(orders::Column::Status, Expr::value(target.to_string()))
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .filter(orders::Column::Status.eq(current.to_string()))
                        .exec(txn)
                        .await?;

                    write_trip_events(txn, entry_id, target, Some(rider_id), lat, lng).await?;
                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;

        if let Some(code) = pickup_code {
            self.notifier
                .send_otp(
                    entry.id,
                    &entry.shipper_id,
                    &entry.recipient_phone,
                    &code,
                    "pickup",
                )
                .await;
        }
        self.publish_pool_update(&entry);

        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Verify the pickup OTP and move the entry (and all orders) to pickedup.
    /// Cash entries also need the rider's cash-collection confirmation; a cash
    /// decline cancels the whole entry.
    pub async fn confirm_pickup(
        &self,
        entry_id: i32,
        req: VerifyOtpRequest,
    ) -> Result<EntryResponse> {
        let entry = self.load_entry(entry_id).await?;
        self.require_assigned_rider(&entry, &req.rider_id).await?;

        let current = parse_status(&entry.status)?;

        // Retry of an already-verified code: no double advance
        if current.rank() >= EntryStatus::Pickedup.rank() && entry.otp_code.is_none() {
            let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;
            return Ok(EntryResponse::from_models(entry, order_models));
        }

        if current != EntryStatus::ArrivedAtPickup {
            return Err(DispatchError::Conflict(format!(
                "entry {} is not awaiting pickup confirmation",
                entry_id
            )));
        }

        let stored = entry
            .otp_code
            .clone()
            .ok_or_else(|| DispatchError::Conflict("no pickup code issued".to_string()))?;

        let now = Utc::now();
        let attempts = otp::parse_attempts(entry.otp_attempts.as_ref());
        match otp::evaluate(&attempts, &stored, &req.code, now) {
            otp::OtpDecision::Match => {}
            otp::OtpDecision::Mismatch { tries_left } => {
                self.record_failed_entry_attempt(&entry, &req, now).await?;
                return Err(DispatchError::Validation(format!(
                    "incorrect code, {} tries left",
                    tries_left
                )));
            }
            otp::OtpDecision::Locked { remaining_secs } => {
                // A fresh mismatch that exhausted the tries is still recorded;
                // a submission during an existing cool-down is not.
                if otp::lockout_remaining(&attempts, now).is_none() {
                    self.record_failed_entry_attempt(&entry, &req, now).await?;
                }
                return Err(DispatchError::RateLimited(remaining_secs));
            }
        }

        let method = entry
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(DispatchError::Validation)?;

        if method == PaymentMethod::Cash {
            match req.cash_collected {
                Some(true) => {}
                Some(false) => {
                    tracing::warn!(entry_id, "Cash collection declined at pickup, cancelling");
                    return self.cancel_entry(entry_id, Some(req.rider_id.clone())).await;
                }
                None => {
                    return Err(DispatchError::Validation(
                        "cash_collected is required for cash entries".to_string(),
                    ));
                }
            }
        }

        let rider_id = req.rider_id.clone();
        let (lat, lng) = (req.lat, req.lng);
        let now_fixed: sea_orm::prelude::DateTimeWithTimeZone = now.into();

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                let rider_id = rider_id.clone();
                Box::pin(async move {
                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::Pickedup.to_string()),
                        )
                        .col_expr(
                            entries::Column::OtpCode,
                            Expr::value(Option::<String>::None),
                        )
                        .col_expr(
                            entries::Column::OtpAttempts,
                            Expr::value(Option::<serde_json::Value>::None),
                        )
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(
                            entries::Column::Status
                                .eq(EntryStatus::ArrivedAtPickup.to_string()),
                        )
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "entry {} changed state concurrently",
                            entry_id
                        )));
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::Pickedup.to_string()),
                        )
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .filter(
                            orders::Column::Status.eq(EntryStatus::ArrivedAtPickup.to_string()),
                        )
                        .exec(txn)
                        .await?;

                    // Cash settles the moment the rider confirms collection
                    if method == PaymentMethod::Cash {
                        Transactions::update_many()
                            .col_expr(
                                transactions::Column::Status,
                                Expr::value(TransactionStatus::Approved.to_string()),
                            )
                            .col_expr(
                                transactions::Column::ApprovedAt,
                                Expr::value(Some(now_fixed)),
                            )
                            .filter(transactions::Column::EntryId.eq(entry_id))
                            .exec(txn)
                            .await?;
                    }

                    write_trip_events(
                        txn,
                        entry_id,
                        EntryStatus::Pickedup,
                        Some(rider_id),
                        lat,
                        lng,
                    )
                    .await?;
                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;
        self.publish_pool_update(&entry);

        tracing::info!(entry_id, "Pickup confirmed");
        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Per-order delivery leg: enrouteToDelivery, arrivedAtDelivery.
    /// Arrival issues that order's delivery OTP.
    pub async fn rider_progress_order(
        &self,
        order_id: i32,
        target: EntryStatus,
        req: RiderProgressRequest,
    ) -> Result<EntryResponse> {
        debug_assert!(matches!(
            target,
            EntryStatus::EnrouteToDelivery | EntryStatus::ArrivedAtDelivery
        ));

        let order = self.load_order(order_id).await?;
        let entry = self.load_entry(order.entry_id).await?;
        self.require_assigned_rider_of_order(&entry, &order, &req.rider_id)
            .await?;

        let current = parse_status(&order.status)?;
        if !current.can_advance_to(target) {
            return Err(DispatchError::Conflict(format!(
                "cannot move order from {} to {}",
                current, target
            )));
        }

        let delivery_code = if target == EntryStatus::ArrivedAtDelivery {
            Some(otp::generate_code())
        } else {
            None
        };
        let code_for_txn = delivery_code.clone();
        let entry_status = parse_status(&entry.status)?;
        let entry_id = entry.id;
        let rider_id = req.rider_id.clone();
        let (lat, lng) = (req.lat, req.lng);

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                let rider_id = rider_id.clone();
                let code = code_for_txn.clone();
                Box::pin(async move {
                    let mut update = Orders::update_many()
                        .col_expr(orders::Column::Status, Expr::value(target.to_string()))
                        .filter(orders::Column::Id.eq(order_id))
                        .filter(orders::Column::Status.eq(current.to_string()));
                    if let Some(code) = &code {
                        update = update
                            .col_expr(orders::Column::OtpCode, Expr::value(Some(code.clone())))
                            .col_expr(
                                orders::Column::OtpAttempts,
                                Expr::value(Option::<serde_json::Value>::None),
                            );
                    }
                    let updated = update.exec(txn).await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "order {} changed state concurrently",
                            order_id
                        )));
                    }

                    // The entry tracks the furthest order during the delivery legs
                    if target.rank() > entry_status.rank() {
                        Entries::update_many()
                            .col_expr(entries::Column::Status, Expr::value(target.to_string()))
                            .filter(entries::Column::Id.eq(entry_id))
                            .filter(entries::Column::Status.eq(entry_status.to_string()))
                            .exec(txn)
                            .await?;
                    }

                    let event = trip_events::ActiveModel {
                        event_type: Set(target.to_string()),
                        rider_id: Set(Some(rider_id)),
                        entry_id: Set(entry_id),
                        order_id: Set(order_id),
                        lat: Set(lat),
                        lng: Set(lng),
                        created_at: Set(Utc::now().into()),
                        ..Default::default()
                    };
                    event.insert(txn).await?;
                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;

        if let Some(code) = delivery_code {
            let order_recipient = order_models
                .iter()
                .find(|o| o.id == order_id)
                .map(|o| o.recipient_phone.clone())
                .unwrap_or_default();
            self.notifier
                .send_otp(entry.id, &entry.shipper_id, &order_recipient, &code, "delivery")
                .await;
        }
        self.publish_pool_update(&entry);

        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Verify one order's delivery OTP; when the last sibling is delivered the
    /// entry completes in the same transaction.
    pub async fn confirm_delivery(
        &self,
        order_id: i32,
        req: VerifyOtpRequest,
    ) -> Result<EntryResponse> {
        let order = self.load_order(order_id).await?;
        let entry = self.load_entry(order.entry_id).await?;
        self.require_assigned_rider_of_order(&entry, &order, &req.rider_id)
            .await?;

        let current = parse_status(&order.status)?;

        // Retry of an already-verified code: no double advance
        if current == EntryStatus::Delivered && order.otp_code.is_none() {
            let (entry, order_models) = self.load_entry_with_orders(entry.id).await?;
            return Ok(EntryResponse::from_models(entry, order_models));
        }

        if current != EntryStatus::ArrivedAtDelivery {
            return Err(DispatchError::Conflict(format!(
                "order {} is not awaiting delivery confirmation",
                order_id
            )));
        }

        let stored = order
            .otp_code
            .clone()
            .ok_or_else(|| DispatchError::Conflict("no delivery code issued".to_string()))?;

        let now = Utc::now();
        let attempts = otp::parse_attempts(order.otp_attempts.as_ref());
        match otp::evaluate(&attempts, &stored, &req.code, now) {
            otp::OtpDecision::Match => {}
            otp::OtpDecision::Mismatch { tries_left } => {
                self.record_failed_order_attempt(&order, &req, now).await?;
                return Err(DispatchError::Validation(format!(
                    "incorrect code, {} tries left",
                    tries_left
                )));
            }
            otp::OtpDecision::Locked { remaining_secs } => {
                if otp::lockout_remaining(&attempts, now).is_none() {
                    self.record_failed_order_attempt(&order, &req, now).await?;
                }
                return Err(DispatchError::RateLimited(remaining_secs));
            }
        }

        let entry_id = entry.id;
        let rider_id = req.rider_id.clone();
        let (lat, lng) = (req.lat, req.lng);
        let now_fixed: sea_orm::prelude::DateTimeWithTimeZone = now.into();

        let completed = self
            .db
            .transaction::<_, bool, DispatchError>(move |txn| {
                let rider_id = rider_id.clone();
                Box::pin(async move {
                    let updated = Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::Delivered.to_string()),
                        )
                        .col_expr(orders::Column::DeliveredAt, Expr::value(Some(now_fixed)))
                        .col_expr(orders::Column::OtpCode, Expr::value(Option::<String>::None))
                        .col_expr(
                            orders::Column::OtpAttempts,
                            Expr::value(Option::<serde_json::Value>::None),
                        )
                        .filter(orders::Column::Id.eq(order_id))
                        .filter(
                            orders::Column::Status
                                .eq(EntryStatus::ArrivedAtDelivery.to_string()),
                        )
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "order {} changed state concurrently",
                            order_id
                        )));
                    }

                    let event = trip_events::ActiveModel {
                        event_type: Set(EntryStatus::Delivered.to_string()),
                        rider_id: Set(Some(rider_id.clone())),
                        entry_id: Set(entry_id),
                        order_id: Set(order_id),
                        lat: Set(lat),
                        lng: Set(lng),
                        created_at: Set(now_fixed),
                        ..Default::default()
                    };
                    event.insert(txn).await?;

                    // Entry completes only when no sibling remains undelivered
                    let undelivered = Orders::find()
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .filter(
                            orders::Column::Status.ne(EntryStatus::Delivered.to_string()),
                        )
                        .all(txn)
                        .await?;

                    if undelivered.is_empty() {
                        // The entry may have been bumped by a sibling's progress
                        // since it was read, so the guard is only "not already
                        // terminal", never a stale status snapshot
                        let updated = Entries::update_many()
                            .col_expr(
                                entries::Column::Status,
                                Expr::value(EntryStatus::Completed.to_string()),
                            )
                            .filter(entries::Column::Id.eq(entry_id))
                            .filter(entries::Column::Status.is_not_in([
                                EntryStatus::Completed.to_string(),
                                EntryStatus::Cancelled.to_string(),
                            ]))
                            .exec(txn)
                            .await?;
                        if updated.rows_affected == 1 {
                            write_trip_events(
                                txn,
                                entry_id,
                                EntryStatus::Completed,
                                Some(rider_id),
                                lat,
                                lng,
                            )
                            .await?;
                            return Ok(true);
                        }
                    }
                    Ok(false)
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;
        self.publish_pool_update(&entry);

        if completed {
            tracing::info!(entry_id, "All orders delivered, entry completed");
        }
        Ok(EntryResponse::from_models(entry, order_models))
    }

    /// Cancel an entry (administrative, or cash decline at pickup). Reverts
    /// every order and marks the transaction declined.
    pub async fn cancel_entry(
        &self,
        entry_id: i32,
        rider_id: Option<String>,
    ) -> Result<EntryResponse> {
        let entry = self.load_entry(entry_id).await?;
        let current = parse_status(&entry.status)?;
        if !current.can_cancel() {
            return Err(DispatchError::Conflict(format!(
                "entry {} can no longer be cancelled",
                entry_id
            )));
        }

        let now_fixed: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        self.db
            .transaction::<_, (), DispatchError>(move |txn| {
                let rider_id = rider_id.clone();
                Box::pin(async move {
                    let updated = Entries::update_many()
                        .col_expr(
                            entries::Column::Status,
                            Expr::value(EntryStatus::Cancelled.to_string()),
                        )
                        .col_expr(entries::Column::CancelledAt, Expr::value(Some(now_fixed)))
                        .col_expr(
                            entries::Column::OtpCode,
                            Expr::value(Option::<String>::None),
                        )
                        .filter(entries::Column::Id.eq(entry_id))
                        .filter(entries::Column::Status.eq(current.to_string()))
                        .exec(txn)
                        .await?;
                    if updated.rows_affected != 1 {
                        return Err(DispatchError::Conflict(format!(
                            "entry {} changed state concurrently",
                            entry_id
                        )));
                    }

                    Orders::update_many()
                        .col_expr(
                            orders::Column::Status,
                            Expr::value(EntryStatus::Cancelled.to_string()),
                        )
                        .col_expr(orders::Column::OtpCode, Expr::value(Option::<String>::None))
                        .filter(orders::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    Transactions::update_many()
                        .col_expr(
                            transactions::Column::Status,
                            Expr::value(TransactionStatus::Declined.to_string()),
                        )
                        .filter(transactions::Column::EntryId.eq(entry_id))
                        .exec(txn)
                        .await?;

                    write_trip_events(txn, entry_id, EntryStatus::Cancelled, rider_id, None, None)
                        .await?;
                    Ok(())
                })
            })
            .await?;

        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;
        self.publish_pool_update(&entry);

        tracing::info!(entry_id, "Entry cancelled");
        Ok(EntryResponse::from_models(entry, order_models))
    }

    pub async fn get_entry(&self, entry_id: i32) -> Result<EntryResponse> {
        let (entry, order_models) = self.load_entry_with_orders(entry_id).await?;
        Ok(EntryResponse::from_models(entry, order_models))
    }

    async fn load_entry(&self, entry_id: i32) -> Result<entries::Model> {
        Entries::find_by_id(entry_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(DispatchError::NotFound("entry"))
    }

    async fn load_order(&self, order_id: i32) -> Result<orders::Model> {
        Orders::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(DispatchError::NotFound("order"))
    }

    async fn load_entry_with_orders(
        &self,
        entry_id: i32,
    ) -> Result<(entries::Model, Vec<orders::Model>)> {
        let entry = self.load_entry(entry_id).await?;
        let order_models = Orders::find()
            .filter(orders::Column::EntryId.eq(entry_id))
            .all(self.db.as_ref())
            .await?;
        Ok((entry, order_models))
    }

    /// The acting rider must be the entry's assigned rider and currently
    /// online + active per the account service.
    async fn require_assigned_rider(
        &self,
        entry: &entries::Model,
        rider_id: &str,
    ) -> Result<()> {
        self.require_rider_identity(entry, rider_id)?;
        let profile = self.accounts.get_rider(rider_id).await?;
        if !profile.online || !profile.active {
            return Err(DispatchError::Conflict(
                "rider is not online and active".to_string(),
            ));
        }
        Ok(())
    }

    async fn require_assigned_rider_of_order(
        &self,
        entry: &entries::Model,
        order: &orders::Model,
        rider_id: &str,
    ) -> Result<()> {
        if order.rider_id.as_deref() != Some(rider_id) {
            return Err(DispatchError::Conflict(
                "rider is not assigned to this order".to_string(),
            ));
        }
        self.require_assigned_rider(entry, rider_id).await
    }

    fn require_rider_identity(&self, entry: &entries::Model, rider_id: &str) -> Result<()> {
        if entry.rider_id.as_deref() != Some(rider_id) {
            return Err(DispatchError::Conflict(
                "rider is not assigned to this entry".to_string(),
            ));
        }
        Ok(())
    }

    /// The append happens database-side (jsonb concatenation) so two
    /// concurrent wrong submissions both land in the list
    async fn record_failed_entry_attempt(
        &self,
        entry: &entries::Model,
        req: &VerifyOtpRequest,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let (_, appended) = otp::append_attempt(Vec::new(), &req.code, req.lat, req.lng, now);
        Entries::update_many()
            .col_expr(
                entries::Column::OtpAttempts,
                Expr::cust_with_values("COALESCE(otp_attempts, '[]'::jsonb) || ?", [appended]),
            )
            .filter(entries::Column::Id.eq(entry.id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn record_failed_order_attempt(
        &self,
        order: &orders::Model,
        req: &VerifyOtpRequest,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let (_, appended) = otp::append_attempt(Vec::new(), &req.code, req.lat, req.lng, now);
        Orders::update_many()
            .col_expr(
                orders::Column::OtpAttempts,
                Expr::cust_with_values("COALESCE(otp_attempts, '[]'::jsonb) || ?", [appended]),
            )
            .filter(orders::Column::Id.eq(order.id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    fn publish_pool_update(&self, entry: &entries::Model) {
        self.events.publish(DispatchEvent::new(
            DispatchEventKind::PoolUpdate,
            Audience::Admin,
            entry.id,
            entry.status.clone(),
        ));
    }
}

fn parse_status(raw: &str) -> Result<EntryStatus> {
    raw.parse::<EntryStatus>().map_err(DispatchError::Validation)
}

/// One TripEvent per owned order for an entry-level transition
pub(crate) async fn write_trip_events(
    txn: &DatabaseTransaction,
    entry_id: i32,
    transition: EntryStatus,
    rider_id: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> std::result::Result<(), sea_orm::DbErr> {
    let order_rows = Orders::find()
        .filter(orders::Column::EntryId.eq(entry_id))
        .all(txn)
        .await?;

    let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
    let events: Vec<trip_events::ActiveModel> = order_rows
        .iter()
        .map(|order| trip_events::ActiveModel {
            event_type: Set(transition.to_string()),
            rider_id: Set(rider_id.clone()),
            entry_id: Set(entry_id),
            order_id: Set(order.id),
            lat: Set(lat),
            lng: Set(lng),
            created_at: Set(now),
            ..Default::default()
        })
        .collect();

    if !events.is_empty() {
        TripEvents::insert_many(events).exec(txn).await?;
    }
    Ok(())
}
