//! Offloading configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stayhub_core::TaskFamily;

use crate::PoolError;

/// Upper bound on units per pool.
pub const MAX_WORKERS: usize = 10;

/// Unit count for a pool created without an explicit capacity: the host's
/// available parallelism, capped at [`MAX_WORKERS`].
pub fn default_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_WORKERS)
}

/// Dataset sizes at or above which work is offloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    /// Records for filter, sort, search and hotel search.
    pub records: usize,

    /// Bookings for analytics, earnings and revenue.
    pub bookings: usize,

    /// Bookings for dashboard stats.
    pub stats_bookings: usize,

    /// Hotels for dashboard stats.
    pub stats_hotels: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            records: 50,
            bookings: 100,
            stats_bookings: 100,
            stats_hotels: 20,
        }
    }
}

/// Pool and binding-layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OffloadConfig {
    /// Units per family. Families left out use [`default_capacity`].
    pub capacities: BTreeMap<TaskFamily, usize>,

    /// Offload thresholds.
    pub thresholds: Thresholds,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            capacities: TaskFamily::ALL
                .iter()
                .map(|family| (*family, family.default_capacity()))
                .collect(),
            thresholds: Thresholds::default(),
        }
    }
}

impl OffloadConfig {
    /// Parse a JSON document. Missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, PoolError> {
        serde_json::from_str(raw).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Set every family to the same capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        for family in TaskFamily::ALL {
            self.capacities.insert(family, capacity);
        }
        self
    }

    /// Set one family's capacity.
    pub fn with_family_capacity(mut self, family: TaskFamily, capacity: usize) -> Self {
        self.capacities.insert(family, capacity);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Effective capacity of a family's pool, clamped to `1..=MAX_WORKERS`.
    pub fn capacity_for(&self, family: TaskFamily) -> usize {
        self.capacities
            .get(&family)
            .copied()
            .unwrap_or_else(default_capacity)
            .clamp(1, MAX_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OffloadConfig::default();
        assert_eq!(config.capacity_for(TaskFamily::DataFilter), 4);
        assert_eq!(config.capacity_for(TaskFamily::Stats), 2);
        assert_eq!(config.thresholds.records, 50);
        assert_eq!(config.thresholds.stats_hotels, 20);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let config = OffloadConfig::default()
            .with_family_capacity(TaskFamily::Search, 0)
            .with_family_capacity(TaskFamily::Analytics, 64);
        assert_eq!(config.capacity_for(TaskFamily::Search), 1);
        assert_eq!(config.capacity_for(TaskFamily::Analytics), MAX_WORKERS);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OffloadConfig::from_json(
            r#"{"capacities": {"analytics": 3}, "thresholds": {"records": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.capacity_for(TaskFamily::Analytics), 3);
        assert_eq!(config.capacity_for(TaskFamily::DataFilter), default_capacity());
        assert_eq!(config.thresholds.records, 10);
        assert_eq!(config.thresholds.bookings, 100);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = OffloadConfig::from_json(r#"{"capacities": {"nope": 1}}"#).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }
}
