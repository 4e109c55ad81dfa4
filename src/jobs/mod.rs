pub mod pool_sweeper;
