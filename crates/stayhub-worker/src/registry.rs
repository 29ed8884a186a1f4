//! Per-family pool registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use stayhub_core::{
    AnalyticsSummary, BookingFilters, BookingsPayload, DashboardStats, EarningsSummary,
    FilterOptions, FromTaskOutput, HotelFilters, HotelSearchPayload, HotelSearchResult,
    PoolStatus, SearchPayload, SortOrder, StatsPayload, TaskFamily, TaskRequest,
};
use tracing::info;

use crate::pool::{TaskHandle, WorkerPool};
use crate::unit::{ComputeHandler, TaskHandler};
use crate::{OffloadConfig, PoolError};

/// Holds at most one [`WorkerPool`] per task family.
///
/// Pools are created on first use and torn down by [`cleanup`](Self::cleanup);
/// the next use after a cleanup starts a fresh pool. The registry is an
/// ordinary value owned by the application root, so separate registries
/// never share pools.
pub struct PoolRegistry {
    config: OffloadConfig,
    handler: Arc<dyn TaskHandler>,
    pools: Mutex<HashMap<TaskFamily, Arc<WorkerPool>>>,
}

impl PoolRegistry {
    /// Registry whose units run the shared compute functions.
    pub fn new(config: OffloadConfig) -> Self {
        Self::with_handler(config, Arc::new(ComputeHandler))
    }

    /// Registry whose units run `handler`.
    pub fn with_handler(config: OffloadConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            config,
            handler,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskFamily, Arc<WorkerPool>>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The family's pool, started on first use.
    pub fn pool(&self, family: TaskFamily) -> Result<Arc<WorkerPool>, PoolError> {
        let mut pools = self.lock();
        if let Some(pool) = pools.get(&family) {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(WorkerPool::new(
            family,
            self.config.capacity_for(family),
            Arc::clone(&self.handler),
        )?);
        pools.insert(family, Arc::clone(&pool));
        Ok(pool)
    }

    /// Returns true if the family's pool is currently running.
    pub fn is_active(&self, family: TaskFamily) -> bool {
        self.lock().contains_key(&family)
    }

    /// Submit a request to its family's pool.
    pub fn execute(&self, request: TaskRequest) -> TaskHandle {
        match self.pool(request.family()) {
            Ok(pool) => pool.execute(request),
            Err(e) => TaskHandle::rejected(e),
        }
    }

    /// Submit a request and extract a concrete output type.
    pub async fn run<T: FromTaskOutput>(&self, request: TaskRequest) -> Result<T, PoolError> {
        self.execute(request).wait_as().await
    }

    pub async fn filter_and_sort_data(
        &self,
        data: Vec<Value>,
        options: FilterOptions,
    ) -> Result<Vec<Value>, PoolError> {
        self.run(TaskRequest::filter(data, options)).await
    }

    pub async fn sort_data(
        &self,
        data: Vec<Value>,
        sort_by: impl Into<String>,
        sort_order: SortOrder,
    ) -> Result<Vec<Value>, PoolError> {
        self.run(TaskRequest::sort(data, sort_by, sort_order)).await
    }

    pub async fn search_items(
        &self,
        items: Vec<Value>,
        search_term: impl Into<String>,
        search_fields: Vec<String>,
    ) -> Result<Vec<Value>, PoolError> {
        self.run(TaskRequest::Search(SearchPayload {
            items,
            search_term: search_term.into(),
            search_fields,
        }))
        .await
    }

    pub async fn filter_hotels(
        &self,
        hotels: Vec<Value>,
        filters: HotelFilters,
    ) -> Result<HotelSearchResult, PoolError> {
        self.run(TaskRequest::HotelSearch(HotelSearchPayload { hotels, filters }))
            .await
    }

    pub async fn calculate_analytics(
        &self,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> Result<AnalyticsSummary, PoolError> {
        self.run(TaskRequest::Analytics(BookingsPayload { bookings, filters }))
            .await
    }

    pub async fn calculate_earnings(
        &self,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> Result<EarningsSummary, PoolError> {
        self.run(TaskRequest::Earnings(BookingsPayload { bookings, filters }))
            .await
    }

    pub async fn calculate_revenue(
        &self,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> Result<f64, PoolError> {
        self.run(TaskRequest::Revenue(BookingsPayload { bookings, filters }))
            .await
    }

    pub async fn calculate_dashboard_stats(
        &self,
        hotels: Vec<Value>,
        bookings: Vec<Value>,
    ) -> Result<DashboardStats, PoolError> {
        self.run(TaskRequest::CalculateStats(StatsPayload::new(hotels, bookings)))
            .await
    }

    /// Terminate every pool and forget it.
    pub fn cleanup(&self) {
        let pools: Vec<_> = self.lock().drain().collect();
        if pools.is_empty() {
            return;
        }
        for (_, pool) in &pools {
            pool.terminate();
        }
        info!(pools = pools.len(), "Worker pools cleaned up");
    }

    /// Status of every family; `None` when its pool is not running.
    pub fn status(&self) -> BTreeMap<TaskFamily, Option<PoolStatus>> {
        let pools = self.lock();
        TaskFamily::ALL
            .iter()
            .map(|family| (*family, pools.get(family).map(|pool| pool.status())))
            .collect()
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> PoolRegistry {
        PoolRegistry::new(OffloadConfig::default().with_capacity(2))
    }

    #[tokio::test]
    async fn test_pools_created_lazily() {
        let registry = registry();
        assert!(registry.status().values().all(Option::is_none));

        let sorted = registry
            .sort_data(vec![json!(3), json!(1), json!(2)], "", SortOrder::Asc)
            .await
            .unwrap();
        assert_eq!(sorted, vec![json!(1), json!(2), json!(3)]);

        assert!(registry.is_active(TaskFamily::DataFilter));
        assert!(!registry.is_active(TaskFamily::Analytics));
        let status = registry.status();
        assert_eq!(status[&TaskFamily::DataFilter].unwrap().total_workers, 2);
        assert_eq!(status[&TaskFamily::Stats], None);
    }

    #[tokio::test]
    async fn test_same_pool_is_reused() {
        let registry = registry();
        let first = registry.pool(TaskFamily::Search).unwrap();
        let second = registry.pool(TaskFamily::Search).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_cleanup_then_recreate() {
        let registry = registry();
        let old = registry.pool(TaskFamily::Analytics).unwrap();

        registry.cleanup();
        assert!(old.is_terminated());
        assert!(!registry.is_active(TaskFamily::Analytics));

        let revenue = registry
            .calculate_revenue(
                vec![json!({"status": "COMPLETED", "totalPrice": 120})],
                BookingFilters::default(),
            )
            .await
            .unwrap();
        assert_eq!(revenue, 120.0);
        let fresh = registry.pool(TaskFamily::Analytics).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
    }

    #[tokio::test]
    async fn test_wrappers_route_by_family() {
        let registry = registry();
        let hotels = vec![json!({"name": "Sea Breeze", "city": "Da Nang"})];
        let found = registry
            .filter_hotels(
                hotels,
                HotelFilters {
                    query: Some("breeze".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.count, 1);

        let stats = registry
            .calculate_dashboard_stats(vec![json!({"rooms": [1, 2]})], vec![])
            .await
            .unwrap();
        assert_eq!(stats.total_rooms, 2);
        assert!(registry.is_active(TaskFamily::Search));
        assert!(registry.is_active(TaskFamily::Stats));
    }
}
