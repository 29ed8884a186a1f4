//! StayHub Core Task Types
//!
//! This crate contains the pure half of the StayHub offloading subsystem,
//! with no dependencies on:
//! - Threads or async runtimes
//! - Pool bookkeeping
//! - I/O
//!
//! Task requests, their typed outputs, and the [`compute`] functions that
//! evaluate them live here so that worker units and the synchronous fallback
//! path share one implementation.

pub mod compute;
pub mod error;
pub mod ids;
pub mod status;
pub mod summary;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{TaskId, UnitId};
pub use status::{PoolStatus, UnitState};
pub use summary::{
    AnalyticsSummary, DashboardStats, EarningsSummary, FromTaskOutput, HotelSearchResult,
    MonthlyEarnings, MonthlyRevenue, TaskOutput,
};
pub use task::{
    BookingFilters, BookingsPayload, FilterOptions, FilterPayload, HotelFilters,
    HotelSearchPayload, SearchPayload, SortOrder, SortPayload, StatsPayload, TaskEnvelope,
    TaskFamily, TaskReply, TaskRequest,
};
