//! Dashboard overview statistics.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::value::{money, record_instant, str_field};
use crate::DashboardStats;

/// Month boundaries around a clock reading.
struct Calendar {
    today: NaiveDate,
    last_month: NaiveDateTime,
    this_month: NaiveDateTime,
    next_month: NaiveDateTime,
}

impl Calendar {
    fn at(as_of: NaiveDateTime) -> Option<Self> {
        let first = as_of.date().with_day(1)?;
        Some(Self {
            today: as_of.date(),
            last_month: first.checked_sub_months(Months::new(1))?.and_hms_opt(0, 0, 0)?,
            this_month: first.and_hms_opt(0, 0, 0)?,
            next_month: first.checked_add_months(Months::new(1))?.and_hms_opt(0, 0, 0)?,
        })
    }
}

fn status_is(booking: &Value, wanted: &[&str]) -> bool {
    str_field(booking, "status").map_or(false, |status| wanted.contains(&status))
}

/// Overview numbers for the host dashboard, computed against `as_of`.
///
/// Month revenue is bucketed by `checkedOutAt`: this month is
/// `[first of month, first of next month)`, last month is
/// `[first of previous month, first of month)`.
pub fn dashboard_stats(
    hotels: &[Value],
    bookings: &[Value],
    as_of: NaiveDateTime,
) -> DashboardStats {
    let total_rooms: usize = hotels
        .iter()
        .filter_map(|hotel| hotel.get("rooms").and_then(Value::as_array))
        .map(Vec::len)
        .sum();

    let completed: Vec<&Value> = bookings
        .iter()
        .filter(|b| status_is(b, &["COMPLETED"]))
        .collect();

    let mut stats = DashboardStats {
        total_hotels: hotels.len(),
        total_rooms,
        total_bookings: bookings.len(),
        confirmed_bookings: bookings
            .iter()
            .filter(|b| status_is(b, &["CONFIRMED", "CHECKED_IN", "COMPLETED"]))
            .count(),
        total_revenue: completed.iter().map(|b| money(b.get("totalPrice"))).sum(),
        ..Default::default()
    };

    let Some(calendar) = Calendar::at(as_of) else {
        return stats;
    };

    for booking in &completed {
        let Some(out) = record_instant(booking, &["checkedOutAt"]) else {
            continue;
        };
        let price = money(booking.get("totalPrice"));
        if out >= calendar.this_month && out < calendar.next_month {
            stats.this_month_revenue += price;
        } else if out >= calendar.last_month && out < calendar.this_month {
            stats.last_month_revenue += price;
        }
    }

    for booking in bookings {
        let check_in = record_instant(booking, &["checkInDate"]);
        if status_is(booking, &["CONFIRMED", "CHECKED_IN"])
            && check_in.map_or(false, |at| at >= as_of)
        {
            stats.upcoming_bookings += 1;
        }
        if status_is(booking, &["CONFIRMED"])
            && check_in.map_or(false, |at| at.date() <= calendar.today)
        {
            stats.pending_check_ins += 1;
        }
        if status_is(booking, &["CHECKED_IN"])
            && record_instant(booking, &["checkOutDate"])
                .map_or(false, |at| at.date() <= calendar.today)
        {
            stats.pending_check_outs += 1;
        }
    }

    stats
}
