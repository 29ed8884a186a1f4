//! Typed task outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CoreError;

/// Revenue bucket for one `YYYY-MM` month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: f64,
}

/// Earnings bucket for one `YYYY-MM` month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    pub month: String,
    pub earnings: f64,
}

/// Output of the `analytics` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    /// Revenue from completed bookings.
    pub revenue: f64,
    /// Bookings that passed the filters, whatever their status.
    pub bookings_count: usize,
    pub average_booking_value: f64,
    /// Chronological.
    pub revenue_by_month: Vec<MonthlyRevenue>,
    pub bookings_by_status: BTreeMap<String, usize>,
}

/// Output of the `earnings` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub total_earnings: f64,
    pub completed_count: usize,
    pub average_booking_value: f64,
    pub earnings_by_hotel: BTreeMap<String, f64>,
    /// Chronological.
    pub earnings_by_month: Vec<MonthlyEarnings>,
}

/// Output of the `hotel-search` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSearchResult {
    pub hotels: Vec<Value>,
    pub count: usize,
    /// Criteria that matched at least one hotel, in evaluation order.
    pub matched_fields: Vec<String>,
}

impl HotelSearchResult {
    /// Result that leaves the listing untouched.
    pub fn unfiltered(hotels: Vec<Value>) -> Self {
        Self {
            count: hotels.len(),
            hotels,
            matched_fields: Vec::new(),
        }
    }
}

/// Output of the `calculate-stats` task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_hotels: usize,
    pub total_rooms: usize,
    pub total_bookings: usize,
    pub confirmed_bookings: usize,
    pub total_revenue: f64,
    pub upcoming_bookings: usize,
    pub pending_check_ins: usize,
    pub pending_check_outs: usize,
    pub this_month_revenue: f64,
    pub last_month_revenue: f64,
}

/// Result of evaluating a [`TaskRequest`](crate::TaskRequest).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Records(Vec<Value>),
    HotelSearch(HotelSearchResult),
    Analytics(AnalyticsSummary),
    Earnings(EarningsSummary),
    Revenue(f64),
    Stats(DashboardStats),
}

impl TaskOutput {
    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Records(_) => "records",
            Self::HotelSearch(_) => "hotel-search",
            Self::Analytics(_) => "analytics",
            Self::Earnings(_) => "earnings",
            Self::Revenue(_) => "revenue",
            Self::Stats(_) => "stats",
        }
    }
}

/// Extraction of a concrete result type from a [`TaskOutput`].
pub trait FromTaskOutput: Sized {
    /// Variant name this type is extracted from.
    const EXPECTED: &'static str;

    /// Take the matching variant, or report what arrived instead.
    fn from_output(output: TaskOutput) -> Result<Self, CoreError>;
}

macro_rules! impl_from_output {
    ($ty:ty, $variant:ident, $expected:literal) => {
        impl FromTaskOutput for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_output(output: TaskOutput) -> Result<Self, CoreError> {
                match output {
                    TaskOutput::$variant(value) => Ok(value),
                    other => Err(CoreError::UnexpectedOutput {
                        expected: Self::EXPECTED,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

impl_from_output!(Vec<Value>, Records, "records");
impl_from_output!(HotelSearchResult, HotelSearch, "hotel-search");
impl_from_output!(AnalyticsSummary, Analytics, "analytics");
impl_from_output!(EarningsSummary, Earnings, "earnings");
impl_from_output!(f64, Revenue, "revenue");
impl_from_output!(DashboardStats, Stats, "stats");

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_analytics_serializes_zeroed() {
        let json = serde_json::to_value(AnalyticsSummary::default()).unwrap();
        assert_eq!(
            json,
            json!({
                "revenue": 0.0,
                "bookingsCount": 0,
                "averageBookingValue": 0.0,
                "revenueByMonth": [],
                "bookingsByStatus": {}
            })
        );
    }

    #[test]
    fn test_from_output_rejects_other_variant() {
        let err = Vec::<Value>::from_output(TaskOutput::Revenue(1.0)).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnexpectedOutput {
                expected: "records",
                found: "revenue"
            }
        );
        assert_eq!(f64::from_output(TaskOutput::Revenue(2.5)).unwrap(), 2.5);
    }

    #[test]
    fn test_output_serializes_inner_value() {
        let output = TaskOutput::Records(vec![json!({"id": 1})]);
        assert_eq!(serde_json::to_value(output).unwrap(), json!([{"id": 1}]));
    }
}
