pub mod assignments;
pub mod dispatch_ws;
pub mod entries;
pub mod pool;
pub mod trips;
