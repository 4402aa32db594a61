#![doc = include_str!("../README.md")]

pub mod breaker;
pub mod client;
pub mod error;
pub mod partition;
pub mod pool;
pub mod retry;
pub mod rows;
pub mod schema;
pub mod sqlite;

pub use breaker::CircuitBreaker;
pub use client::TelemetryStore;
pub use error::StoreError;
pub use partition::{MonthPartition, StreamKind};
pub use pool::{ConnectionPool, PoolSettings};
pub use retry::RetryPolicy;
pub use sqlite::{SqliteStore, StoreSettings};
