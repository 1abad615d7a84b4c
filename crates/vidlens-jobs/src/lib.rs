//! Job registry for analysis jobs.
//!
//! This crate provides:
//! - The `JobStore` abstraction with atomic per-job transitions
//! - An in-memory store (default) and a Redis store for durability
//! - `JobRegistry`, the status/result query and transition surface

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod registry;
pub mod store;

pub use error::{JobsError, JobsResult};
pub use memory::InMemoryJobStore;
pub use redis_store::RedisJobStore;
pub use registry::{JobRegistry, StatusCounts};
pub use store::{JobStore, StoreBackend, StoreConfig};
