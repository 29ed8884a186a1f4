//! Status types for worker units and pools.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a worker unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    /// Unit is idle and on the pool's free list.
    #[default]
    Free,
    /// Unit holds exactly one in-flight task.
    Busy,
    /// Unit crashed while running a task and is awaiting replacement.
    Faulted,
    /// Unit has been released and will never run another task.
    Terminated,
}

impl UnitState {
    /// Returns true if the unit can be handed a task.
    pub fn can_accept_tasks(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// Returns true if the unit is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Read-only snapshot of a pool, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Units currently owned by the pool (free + busy).
    pub total_workers: usize,
    /// Units on the free list.
    pub available_workers: usize,
    /// Tasks dispatched to a unit and awaiting a reply.
    pub active_tasks: usize,
    /// Tasks waiting for a free unit.
    pub queued_tasks: usize,
}

impl PoolStatus {
    /// Units that are running a task.
    pub fn busy_workers(&self) -> usize {
        self.total_workers.saturating_sub(self.available_workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_free_units_accept_tasks() {
        assert!(UnitState::Free.can_accept_tasks());
        assert!(!UnitState::Busy.can_accept_tasks());
        assert!(!UnitState::Faulted.can_accept_tasks());
        assert!(UnitState::Terminated.is_terminal());
    }

    #[test]
    fn test_pool_status_serializes_camel_case() {
        let status = PoolStatus {
            total_workers: 4,
            available_workers: 1,
            active_tasks: 3,
            queued_tasks: 7,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["totalWorkers"], 4);
        assert_eq!(json["queuedTasks"], 7);
        assert_eq!(status.busy_workers(), 3);
    }
}
