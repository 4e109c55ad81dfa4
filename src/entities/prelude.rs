pub use super::entries::Entity as Entries;
pub use super::orders::Entity as Orders;
pub use super::rider_assignment_requests::Entity as RiderAssignmentRequests;
pub use super::transactions::Entity as Transactions;
pub use super::trip_events::Entity as TripEvents;
