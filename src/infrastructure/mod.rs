//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod shutdown;
pub mod worker_pool;

pub use shutdown::{shutdown_signal, InFlightGuard, ShutdownController};
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
