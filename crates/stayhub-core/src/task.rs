//! Task requests, their payloads, and the unit wire envelope.

use std::fmt;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{TaskId, TaskOutput};

/// Pool family a task is dispatched to.
///
/// Each family owns one pool; families are fully independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskFamily {
    /// Generic filter, sort and search over record arrays.
    DataFilter,
    /// Hotel listing search.
    Search,
    /// Booking analytics, earnings and revenue.
    Analytics,
    /// Dashboard overview statistics.
    Stats,
}

impl TaskFamily {
    /// Every family, in registry order.
    pub const ALL: [TaskFamily; 4] = [
        TaskFamily::DataFilter,
        TaskFamily::Search,
        TaskFamily::Analytics,
        TaskFamily::Stats,
    ];

    /// Wire name of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataFilter => "data-filter",
            Self::Search => "search",
            Self::Analytics => "analytics",
            Self::Stats => "stats",
        }
    }

    /// Unit count used when no capacity is configured for the family.
    pub fn default_capacity(&self) -> usize {
        match self {
            Self::DataFilter | Self::Search => 4,
            Self::Analytics | Self::Stats => 2,
        }
    }
}

impl fmt::Display for TaskFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Apply the direction to an ascending comparison.
    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Options for the combined filter task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Case-insensitive match against every top-level string field.
    #[serde(default)]
    pub search_term: Option<String>,
    /// Field predicates: equality, all-of arrays, or `{min, max}` ranges.
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
    /// Field to sort by after filtering.
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
}

impl FilterOptions {
    /// Builder method to set the search term.
    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Builder method to add a field predicate.
    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters
            .get_or_insert_with(Map::new)
            .insert(field.into(), value);
        self
    }

    /// Builder method to set the sort key and direction.
    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPayload {
    pub data: Vec<Value>,
    #[serde(default)]
    pub filters: FilterOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortPayload {
    pub data: Vec<Value>,
    pub sort_by: String,
    #[serde(default)]
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    pub items: Vec<Value>,
    pub search_term: String,
    /// Dotted paths into each item, e.g. `hotel.city`.
    pub search_fields: Vec<String>,
}

/// Criteria for the hotel search task. Unset criteria do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelFilters {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Accepted star ratings (any-of).
    #[serde(default)]
    pub stars: Option<Vec<Value>>,
    /// Required amenity ids (all-of).
    #[serde(default)]
    pub amenities: Option<Vec<Value>>,
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub check_out: Option<String>,
    #[serde(default)]
    pub guests: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearchPayload {
    pub hotels: Vec<Value>,
    #[serde(default)]
    pub filters: HotelFilters,
}

/// Optional narrowing applied before booking aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingFilters {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub hotel_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsPayload {
    pub bookings: Vec<Value>,
    #[serde(default)]
    pub filters: BookingFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub hotels: Vec<Value>,
    pub bookings: Vec<Value>,
    /// Clock reading the stats are computed against.
    ///
    /// Captured when the request is built so every evaluation of the same
    /// request agrees, whichever thread runs it.
    #[serde(default = "utc_now")]
    pub as_of: NaiveDateTime,
}

impl StatsPayload {
    /// Create a payload stamped with the current UTC time.
    pub fn new(hotels: Vec<Value>, bookings: Vec<Value>) -> Self {
        Self {
            hotels,
            bookings,
            as_of: utc_now(),
        }
    }

    /// Builder method to pin the reference time.
    pub fn with_as_of(mut self, as_of: NaiveDateTime) -> Self {
        self.as_of = as_of;
        self
    }
}

fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// A computation request.
///
/// Closed set of task kinds; every handler matches it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum TaskRequest {
    Filter(FilterPayload),
    Sort(SortPayload),
    Search(SearchPayload),
    HotelSearch(HotelSearchPayload),
    Analytics(BookingsPayload),
    Earnings(BookingsPayload),
    Revenue(BookingsPayload),
    CalculateStats(StatsPayload),
}

impl TaskRequest {
    /// Wire tag of the request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Sort(_) => "sort",
            Self::Search(_) => "search",
            Self::HotelSearch(_) => "hotel-search",
            Self::Analytics(_) => "analytics",
            Self::Earnings(_) => "earnings",
            Self::Revenue(_) => "revenue",
            Self::CalculateStats(_) => "calculate-stats",
        }
    }

    /// Pool family responsible for this request.
    pub fn family(&self) -> TaskFamily {
        match self {
            Self::Filter(_) | Self::Sort(_) | Self::Search(_) => TaskFamily::DataFilter,
            Self::HotelSearch(_) => TaskFamily::Search,
            Self::Analytics(_) | Self::Earnings(_) | Self::Revenue(_) => TaskFamily::Analytics,
            Self::CalculateStats(_) => TaskFamily::Stats,
        }
    }

    /// Number of input records, used for logging.
    pub fn input_len(&self) -> usize {
        match self {
            Self::Filter(p) => p.data.len(),
            Self::Sort(p) => p.data.len(),
            Self::Search(p) => p.items.len(),
            Self::HotelSearch(p) => p.hotels.len(),
            Self::Analytics(p) | Self::Earnings(p) | Self::Revenue(p) => p.bookings.len(),
            Self::CalculateStats(p) => p.hotels.len() + p.bookings.len(),
        }
    }

    /// Convenience constructor for a sort request.
    pub fn sort(data: Vec<Value>, sort_by: impl Into<String>, sort_order: SortOrder) -> Self {
        Self::Sort(SortPayload {
            data,
            sort_by: sort_by.into(),
            sort_order,
        })
    }

    /// Convenience constructor for a filter request.
    pub fn filter(data: Vec<Value>, filters: FilterOptions) -> Self {
        Self::Filter(FilterPayload { data, filters })
    }
}

/// Message sent to a worker unit: one task, tagged with its dispatch id.
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub request: TaskRequest,
}

/// Message a worker unit sends back for exactly one envelope.
#[derive(Debug, Clone)]
pub struct TaskReply {
    pub task_id: TaskId,
    /// Output on success, the computation's error message otherwise.
    pub outcome: Result<TaskOutput, String>,
}
