//! Booking aggregates: analytics, earnings and revenue.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::Value;

use super::value::{money, parse_instant, record_instant, str_field, values_equal};
use crate::{
    AnalyticsSummary, BookingFilters, CoreError, EarningsSummary, MonthlyEarnings,
    MonthlyRevenue,
};

const COMPLETED: &str = "COMPLETED";
const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Date keys consulted by analytics and revenue, in order.
const CHECK_IN_KEYS: [&str; 2] = ["checkInDate", "createdAt"];
/// Date keys consulted by earnings, in order.
const CHECK_OUT_KEYS: [&str; 2] = ["checkOutDate", "createdAt"];

/// Parsed form of [`BookingFilters`].
struct Window<'a> {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    hotel_id: Option<&'a Value>,
}

impl<'a> Window<'a> {
    fn parse(filters: &'a BookingFilters) -> Result<Self, CoreError> {
        Ok(Self {
            start: parse_bound("startDate", filters.start_date.as_deref())?,
            end: parse_bound("endDate", filters.end_date.as_deref())?,
            hotel_id: filters
                .hotel_id
                .as_ref()
                .filter(|id| !id.is_null() && id.as_str() != Some("")),
        })
    }

    fn has_dates(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Bookings inside the window. Both bounds are inclusive.
    fn select<'b>(&self, bookings: &'b [Value], date_keys: &[&str]) -> Vec<&'b Value> {
        bookings
            .iter()
            .filter(|booking| {
                if !self.has_dates() {
                    return true;
                }
                let Some(at) = record_instant(booking, date_keys) else {
                    return false;
                };
                self.start.map_or(true, |start| at >= start)
                    && self.end.map_or(true, |end| at <= end)
            })
            .filter(|booking| match self.hotel_id {
                Some(wanted) => booking
                    .get("hotelId")
                    .map_or(false, |have| values_equal(have, wanted)),
                None => true,
            })
            .collect()
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<NaiveDateTime>, CoreError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_instant(raw)
            .map(Some)
            .ok_or_else(|| CoreError::InvalidInput(format!("{name} is not a date: {raw}"))),
    }
}

fn is_completed(booking: &Value) -> bool {
    str_field(booking, "status") == Some(COMPLETED)
}

fn total(bookings: &[&Value]) -> f64 {
    bookings
        .iter()
        .map(|booking| money(booking.get("totalPrice")))
        .sum()
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Sum of prices per `YYYY-MM`, chronological.
///
/// Bookings without a parsable date still count towards totals but land in
/// no month.
fn by_month(bookings: &[&Value], date_keys: &[&str]) -> BTreeMap<String, f64> {
    let mut months = BTreeMap::new();
    for booking in bookings {
        if let Some(at) = record_instant(booking, date_keys) {
            *months.entry(at.format("%Y-%m").to_string()).or_insert(0.0) +=
                money(booking.get("totalPrice"));
        }
    }
    months
}

/// Revenue, volume and status mix of the bookings inside the filter window.
pub fn analytics(
    bookings: &[Value],
    filters: &BookingFilters,
) -> Result<AnalyticsSummary, CoreError> {
    let selected = Window::parse(filters)?.select(bookings, &CHECK_IN_KEYS);
    let completed: Vec<&Value> = selected.iter().copied().filter(|b| is_completed(b)).collect();
    let revenue = total(&completed);

    let mut bookings_by_status = BTreeMap::new();
    for booking in &selected {
        let status = str_field(booking, "status")
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_STATUS);
        *bookings_by_status.entry(status.to_string()).or_insert(0) += 1;
    }

    Ok(AnalyticsSummary {
        revenue,
        bookings_count: selected.len(),
        average_booking_value: average(revenue, completed.len()),
        revenue_by_month: by_month(&completed, &CHECK_IN_KEYS)
            .into_iter()
            .map(|(month, revenue)| MonthlyRevenue { month, revenue })
            .collect(),
        bookings_by_status,
    })
}

/// Host earnings from completed bookings, dated by check-out.
pub fn earnings(
    bookings: &[Value],
    filters: &BookingFilters,
) -> Result<EarningsSummary, CoreError> {
    let completed: Vec<&Value> = Window::parse(filters)?
        .select(bookings, &CHECK_OUT_KEYS)
        .into_iter()
        .filter(|b| is_completed(b))
        .collect();
    let total_earnings = total(&completed);

    let mut earnings_by_hotel = BTreeMap::new();
    for booking in &completed {
        *earnings_by_hotel.entry(hotel_label(booking)).or_insert(0.0) +=
            money(booking.get("totalPrice"));
    }

    Ok(EarningsSummary {
        total_earnings,
        completed_count: completed.len(),
        average_booking_value: average(total_earnings, completed.len()),
        earnings_by_hotel,
        earnings_by_month: by_month(&completed, &CHECK_OUT_KEYS)
            .into_iter()
            .map(|(month, earnings)| MonthlyEarnings { month, earnings })
            .collect(),
    })
}

/// Total price of completed bookings inside the filter window.
pub fn revenue(bookings: &[Value], filters: &BookingFilters) -> Result<f64, CoreError> {
    let completed: Vec<&Value> = Window::parse(filters)?
        .select(bookings, &CHECK_IN_KEYS)
        .into_iter()
        .filter(|b| is_completed(b))
        .collect();
    Ok(total(&completed))
}

fn hotel_label(booking: &Value) -> String {
    if let Some(name) = str_field(booking, "hotelName").filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match booking.get("hotelId") {
        Some(Value::String(id)) => format!("Hotel {id}"),
        Some(Value::Null) | None => "Hotel unknown".to_string(),
        Some(id) => format!("Hotel {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bookings() -> Vec<Value> {
        vec![
            json!({
                "id": 1, "status": "COMPLETED", "totalPrice": 200,
                "checkInDate": "2025-01-10", "checkOutDate": "2025-01-12",
                "hotelId": 7, "hotelName": "Sea Breeze"
            }),
            json!({
                "id": 2, "status": "COMPLETED", "totalPrice": "150.5",
                "checkInDate": "2025-02-28T14:00:00", "checkOutDate": "2025-03-02T11:00:00",
                "hotelId": 8
            }),
            json!({
                "id": 3, "status": "CANCELLED", "totalPrice": 90,
                "checkInDate": "2025-02-01", "hotelId": 7
            }),
            json!({
                "id": 4, "totalPrice": "free", "createdAt": "2025-02-15T09:00:00Z",
                "hotelId": 7
            }),
            json!({
                "id": 5, "status": "COMPLETED", "totalPrice": null,
                "checkInDate": "2024-12-31", "checkOutDate": "2025-01-01",
                "hotelId": 7, "hotelName": "Sea Breeze"
            }),
        ]
    }

    #[test]
    fn test_empty_input_is_zeroed() {
        let filters = BookingFilters::default();
        assert_eq!(analytics(&[], &filters).unwrap(), AnalyticsSummary::default());
        assert_eq!(earnings(&[], &filters).unwrap(), EarningsSummary::default());
        assert_eq!(revenue(&[], &filters).unwrap(), 0.0);
    }

    #[test]
    fn test_analytics_without_filters() {
        let summary = analytics(&bookings(), &BookingFilters::default()).unwrap();
        assert_eq!(summary.revenue, 350.5);
        assert_eq!(summary.bookings_count, 5);
        assert_eq!(summary.average_booking_value, 350.5 / 3.0);
        assert_eq!(
            summary.revenue_by_month,
            vec![
                MonthlyRevenue { month: "2024-12".to_string(), revenue: 0.0 },
                MonthlyRevenue { month: "2025-01".to_string(), revenue: 200.0 },
                MonthlyRevenue { month: "2025-02".to_string(), revenue: 150.5 },
            ]
        );
        assert_eq!(summary.bookings_by_status["COMPLETED"], 3);
        assert_eq!(summary.bookings_by_status["CANCELLED"], 1);
        assert_eq!(summary.bookings_by_status["UNKNOWN"], 1);
    }

    #[test]
    fn test_analytics_date_bounds_are_inclusive() {
        let filters = BookingFilters {
            start_date: Some("2025-01-10".to_string()),
            end_date: Some("2025-02-15T09:00:00Z".to_string()),
            hotel_id: Some(json!(7)),
        };
        let summary = analytics(&bookings(), &filters).unwrap();
        // Bookings 1, 3 and 4 (createdAt fallback) sit inside the window.
        assert_eq!(summary.bookings_count, 3);
        assert_eq!(summary.revenue, 200.0);
        assert_eq!(summary.average_booking_value, 200.0);
    }

    #[test]
    fn test_undated_booking_dropped_only_when_bounded() {
        let data = vec![json!({"status": "COMPLETED", "totalPrice": 10})];
        assert_eq!(revenue(&data, &BookingFilters::default()).unwrap(), 10.0);

        let bounded = BookingFilters {
            start_date: Some("2020-01-01".to_string()),
            ..Default::default()
        };
        assert_eq!(revenue(&data, &bounded).unwrap(), 0.0);
    }

    #[test]
    fn test_earnings_uses_check_out_date() {
        let filters = BookingFilters {
            start_date: Some("2025-01-01".to_string()),
            end_date: Some("2025-03-31".to_string()),
            ..Default::default()
        };
        let summary = earnings(&bookings(), &filters).unwrap();
        assert_eq!(summary.completed_count, 3);
        assert_eq!(summary.total_earnings, 350.5);
        assert_eq!(summary.earnings_by_hotel["Sea Breeze"], 200.0);
        assert_eq!(summary.earnings_by_hotel["Hotel 8"], 150.5);
        let months: Vec<_> = summary
            .earnings_by_month
            .iter()
            .map(|m| m.month.as_str())
            .collect();
        assert_eq!(months, vec!["2025-01", "2025-03"]);
    }

    #[test]
    fn test_revenue_ignores_unfinished_bookings() {
        let filters = BookingFilters {
            end_date: Some("2025-01-31".to_string()),
            ..Default::default()
        };
        assert_eq!(revenue(&bookings(), &filters).unwrap(), 200.0);
    }

    #[test]
    fn test_blank_filters_are_unset() {
        let filters = BookingFilters {
            start_date: Some("  ".to_string()),
            end_date: None,
            hotel_id: Some(json!("")),
        };
        assert_eq!(analytics(&bookings(), &filters).unwrap().bookings_count, 5);
    }

    #[test]
    fn test_unparsable_bound_is_rejected() {
        let filters = BookingFilters {
            end_date: Some("soon".to_string()),
            ..Default::default()
        };
        let err = earnings(&bookings(), &filters).unwrap_err();
        assert_eq!(err, CoreError::InvalidInput("endDate is not a date: soon".to_string()));
    }
}
