// src/lib.rs

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use handlers::dispatch_ws::DispatchBroadcaster;
use services::{accounts::AccountService, notifications::NotificationService};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub accounts: AccountService,
    pub notifier: NotificationService,
    pub events: DispatchBroadcaster,
}

pub mod entities {
    pub mod prelude;
    pub mod entries;
    pub mod orders;
    pub mod transactions;
    pub mod rider_assignment_requests;
    pub mod trip_events;
}

pub mod services {
    pub mod accounts;
    pub mod assignment;
    pub mod lifecycle;
    pub mod notifications;
    pub mod otp;
    pub mod pool;
}

pub mod models;
pub mod handlers;
pub mod jobs;
