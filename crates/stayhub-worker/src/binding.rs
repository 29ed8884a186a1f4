//! Binding layer.
//!
//! Decides per call whether a computation is worth offloading, exposes
//! `{result, loading}` state for one logical query through [`Binding`], and
//! turns every pool failure into a safe fallback value.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDateTime, Utc};
use serde_json::Value;
use stayhub_core::{
    compute, AnalyticsSummary, BookingFilters, BookingsPayload, DashboardStats,
    EarningsSummary, FilterOptions, FromTaskOutput, HotelFilters, HotelSearchPayload,
    HotelSearchResult, PoolStatus, SearchPayload, SortOrder, StatsPayload, TaskFamily,
    TaskRequest,
};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::Thresholds;
use crate::{PoolError, PoolRegistry};

/// Sequence number of one request against a [`Binding`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Result and loading state of one logical query.
///
/// Every request takes a [`Ticket`]; only the most recently issued ticket
/// may publish, so a slow reply can never overwrite a newer one.
pub struct Binding<T> {
    latest: Mutex<u64>,
    loading: watch::Sender<bool>,
    result: watch::Sender<Option<T>>,
}

impl<T> Default for Binding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Binding<T> {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(0),
            loading: watch::channel(false).0,
            result: watch::channel(None).0,
        }
    }

    fn latest(&self) -> MutexGuard<'_, u64> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True strictly between an offloaded dispatch and its resolution.
    pub fn loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn watch_result(&self) -> watch::Receiver<Option<T>> {
        self.result.subscribe()
    }

    /// Start a new request, superseding every earlier ticket.
    pub fn issue(&self) -> Ticket {
        let mut latest = self.latest();
        *latest += 1;
        Ticket(*latest)
    }

    /// Returns true if `ticket` is the most recently issued one.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        *self.latest() == ticket.0
    }

    /// Raise `loading` for an offloaded request, unless it is already stale.
    pub fn mark_loading(&self, ticket: &Ticket) -> bool {
        let latest = self.latest();
        if *latest != ticket.0 {
            return false;
        }
        self.loading.send_if_modified(|loading| !std::mem::replace(loading, true));
        true
    }

    /// Store the value of a finished request and clear `loading`.
    ///
    /// A stale ticket is discarded and leaves both result and loading alone.
    pub fn publish(&self, ticket: Ticket, value: T) -> bool {
        let latest = self.latest();
        if *latest != ticket.0 {
            debug!(ticket = ticket.0, latest = *latest, "Discarding stale reply");
            return false;
        }
        self.result.send_replace(Some(value));
        self.loading.send_if_modified(|loading| std::mem::replace(loading, false));
        true
    }

    /// Clear `loading` for an abandoned request if no newer one exists.
    fn settle(&self, ticket: u64) {
        let latest = self.latest();
        if *latest == ticket {
            self.loading.send_if_modified(|loading| std::mem::replace(loading, false));
        }
    }
}

/// Clears `loading` when a request ends without publishing, such as when
/// the caller drops its future mid-flight.
struct LoadingGuard<'a, T> {
    binding: &'a Binding<T>,
    ticket: u64,
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        self.binding.settle(self.ticket);
    }
}

impl<T: Clone> Binding<T> {
    /// Latest published value.
    pub fn result(&self) -> Option<T> {
        self.result.borrow().clone()
    }
}

/// Binding-layer operations, for logging and fallback accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    FilterAndSort,
    Sort,
    Search,
    FilterHotels,
    Analytics,
    Earnings,
    Revenue,
    DashboardStats,
}

impl Operation {
    pub const COUNT: usize = 8;

    pub const ALL: [Operation; Self::COUNT] = [
        Operation::FilterAndSort,
        Operation::Sort,
        Operation::Search,
        Operation::FilterHotels,
        Operation::Analytics,
        Operation::Earnings,
        Operation::Revenue,
        Operation::DashboardStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilterAndSort => "filter_and_sort",
            Self::Sort => "sort",
            Self::Search => "search",
            Self::FilterHotels => "filter_hotels",
            Self::Analytics => "analytics",
            Self::Earnings => "earnings",
            Self::Revenue => "revenue",
            Self::DashboardStats => "dashboard_stats",
        }
    }
}

/// Input records of a record-shaped request, handed back when it fails.
fn input_records(request: TaskRequest) -> Vec<Value> {
    match request {
        TaskRequest::Filter(p) => p.data,
        TaskRequest::Sort(p) => p.data,
        TaskRequest::Search(p) => p.items,
        _ => Vec::new(),
    }
}

fn input_hotels(request: TaskRequest) -> HotelSearchResult {
    match request {
        TaskRequest::HotelSearch(p) => HotelSearchResult::unfiltered(p.hotels),
        _ => HotelSearchResult::default(),
    }
}

/// Inline evaluation, zeroed if even that fails.
fn inline<T: FromTaskOutput + Default>(request: TaskRequest) -> T {
    compute::run(&request)
        .and_then(T::from_output)
        .unwrap_or_default()
}

/// Routes computations inline or to the registry's pools by dataset size.
///
/// Every operation returns a value and never an error. Record operations
/// fall back to their unprocessed input; aggregate operations fall back to
/// inline evaluation. Each fallback is logged and counted.
pub struct Offloader {
    registry: Arc<PoolRegistry>,
    thresholds: Thresholds,
    fallbacks: [AtomicU64; Operation::COUNT],
}

impl Offloader {
    /// Offloader using the registry's configured thresholds.
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        let thresholds = registry.config().thresholds;
        Self {
            registry,
            thresholds,
            fallbacks: Default::default(),
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    async fn resolve<T>(
        &self,
        binding: &Binding<T>,
        operation: Operation,
        offload: bool,
        request: TaskRequest,
        fallback: impl FnOnce(TaskRequest) -> T,
    ) -> T
    where
        T: FromTaskOutput + Clone,
    {
        let ticket = binding.issue();
        let _guard = LoadingGuard {
            binding,
            ticket: ticket.get(),
        };
        let value = if offload {
            binding.mark_loading(&ticket);
            debug!(
                operation = operation.as_str(),
                records = request.input_len(),
                ticket = ticket.get(),
                "Offloading to worker pool"
            );
            let retained = request.clone();
            match self.registry.run::<T>(request).await {
                Ok(value) => value,
                Err(e) => self.fall_back(operation, &e, || fallback(retained)),
            }
        } else {
            trace!(
                operation = operation.as_str(),
                records = request.input_len(),
                "Computing inline"
            );
            match compute::run(&request).and_then(T::from_output) {
                Ok(value) => value,
                Err(e) => self.fall_back(operation, &PoolError::from(e), || fallback(request)),
            }
        };
        binding.publish(ticket, value.clone());
        value
    }

    fn fall_back<T>(
        &self,
        operation: Operation,
        error: &PoolError,
        fallback: impl FnOnce() -> T,
    ) -> T {
        self.fallbacks[operation as usize].fetch_add(1, Ordering::Relaxed);
        warn!(operation = operation.as_str(), error = %error, "Computation failed, using fallback");
        fallback()
    }

    /// Search, filter, then sort a record array.
    pub async fn filter_and_sort(
        &self,
        binding: &Binding<Vec<Value>>,
        data: Vec<Value>,
        options: FilterOptions,
    ) -> Vec<Value> {
        let offload = data.len() >= self.thresholds.records;
        let request = TaskRequest::filter(data, options);
        self.resolve(binding, Operation::FilterAndSort, offload, request, input_records)
            .await
    }

    pub async fn sort(
        &self,
        binding: &Binding<Vec<Value>>,
        data: Vec<Value>,
        sort_by: impl Into<String>,
        sort_order: SortOrder,
    ) -> Vec<Value> {
        let offload = data.len() >= self.thresholds.records;
        let request = TaskRequest::sort(data, sort_by, sort_order);
        self.resolve(binding, Operation::Sort, offload, request, input_records)
            .await
    }

    /// Search `fields` of every item. A blank term or empty field list
    /// matches everything.
    pub async fn search(
        &self,
        binding: &Binding<Vec<Value>>,
        items: Vec<Value>,
        search_term: impl Into<String>,
        search_fields: Vec<String>,
    ) -> Vec<Value> {
        let search_term = search_term.into();
        if search_term.is_empty() || search_fields.is_empty() {
            binding.publish(binding.issue(), items.clone());
            return items;
        }
        let offload = items.len() >= self.thresholds.records;
        let request = TaskRequest::Search(SearchPayload {
            items,
            search_term,
            search_fields,
        });
        self.resolve(binding, Operation::Search, offload, request, input_records)
            .await
    }

    pub async fn filter_hotels(
        &self,
        binding: &Binding<HotelSearchResult>,
        hotels: Vec<Value>,
        filters: HotelFilters,
    ) -> HotelSearchResult {
        let offload = hotels.len() >= self.thresholds.records;
        let request = TaskRequest::HotelSearch(HotelSearchPayload { hotels, filters });
        self.resolve(binding, Operation::FilterHotels, offload, request, input_hotels)
            .await
    }

    pub async fn analytics(
        &self,
        binding: &Binding<AnalyticsSummary>,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> AnalyticsSummary {
        let offload = bookings.len() >= self.thresholds.bookings;
        let request = TaskRequest::Analytics(BookingsPayload { bookings, filters });
        self.resolve(binding, Operation::Analytics, offload, request, inline)
            .await
    }

    pub async fn earnings(
        &self,
        binding: &Binding<EarningsSummary>,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> EarningsSummary {
        let offload = bookings.len() >= self.thresholds.bookings;
        let request = TaskRequest::Earnings(BookingsPayload { bookings, filters });
        self.resolve(binding, Operation::Earnings, offload, request, inline)
            .await
    }

    pub async fn revenue(
        &self,
        binding: &Binding<f64>,
        bookings: Vec<Value>,
        filters: BookingFilters,
    ) -> f64 {
        let offload = bookings.len() >= self.thresholds.bookings;
        let request = TaskRequest::Revenue(BookingsPayload { bookings, filters });
        self.resolve(binding, Operation::Revenue, offload, request, inline)
            .await
    }

    /// Dashboard stats as of now.
    pub async fn dashboard_stats(
        &self,
        binding: &Binding<DashboardStats>,
        hotels: Vec<Value>,
        bookings: Vec<Value>,
    ) -> DashboardStats {
        self.dashboard_stats_at(binding, hotels, bookings, Utc::now().naive_utc())
            .await
    }

    /// Dashboard stats against a fixed clock reading.
    pub async fn dashboard_stats_at(
        &self,
        binding: &Binding<DashboardStats>,
        hotels: Vec<Value>,
        bookings: Vec<Value>,
        as_of: NaiveDateTime,
    ) -> DashboardStats {
        let offload = bookings.len() >= self.thresholds.stats_bookings
            || hotels.len() >= self.thresholds.stats_hotels;
        let request =
            TaskRequest::CalculateStats(StatsPayload::new(hotels, bookings).with_as_of(as_of));
        self.resolve(binding, Operation::DashboardStats, offload, request, inline)
            .await
    }

    /// Terminate every pool. Later operations start fresh pools.
    pub fn cleanup(&self) {
        self.registry.cleanup();
    }

    pub fn status(&self) -> BTreeMap<TaskFamily, Option<PoolStatus>> {
        self.registry.status()
    }

    /// Fallbacks taken so far, per operation.
    pub fn fallback_counts(&self) -> Vec<(Operation, u64)> {
        Operation::ALL
            .iter()
            .map(|op| (*op, self.fallbacks[*op as usize].load(Ordering::Relaxed)))
            .collect()
    }

    pub fn fallback_count(&self, operation: Operation) -> u64 {
        self.fallbacks[operation as usize].load(Ordering::Relaxed)
    }
}
