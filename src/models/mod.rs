pub mod assignment;
pub mod dispatch_event;
pub mod entry;
pub mod error;
pub mod order;
pub mod otp;
pub mod transaction;
