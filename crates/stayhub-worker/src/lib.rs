//! StayHub Worker Runtime
//!
//! Runs [`stayhub_core`] computations off the calling thread:
//! - [`WorkerPool`]: fixed-capacity pool of OS-thread units for one family
//! - [`PoolRegistry`]: at most one pool per family, created on first use
//! - [`Offloader`] and [`Binding`]: size-threshold offloading with loading
//!   state and safe fallbacks

pub mod binding;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod unit;

pub use binding::{Binding, Offloader, Operation, Ticket};
pub use config::{OffloadConfig, Thresholds, MAX_WORKERS};
pub use error::PoolError;
pub use pool::{TaskHandle, WorkerPool};
pub use registry::PoolRegistry;
pub use unit::{ComputeHandler, TaskHandler};
