//! Task computations.
//!
//! Every task family is a pure function over its payload. Worker units and
//! the inline fallback both call [`run`], so an offloaded request and an
//! inline one produce identical output.

mod bookings;
mod hotels;
mod records;
mod stats;
mod value;

pub use bookings::{analytics, earnings, revenue};
pub use hotels::hotel_search;
pub use records::{filter_and_sort, search, sort};
pub use stats::dashboard_stats;
pub use value::{money, parse_instant};

use crate::{CoreError, TaskOutput, TaskRequest};

/// Evaluate a request.
pub fn run(request: &TaskRequest) -> Result<TaskOutput, CoreError> {
    let output = match request {
        TaskRequest::Filter(p) => TaskOutput::Records(filter_and_sort(&p.data, &p.filters)),
        TaskRequest::Sort(p) => TaskOutput::Records(sort(&p.data, &p.sort_by, p.sort_order)),
        TaskRequest::Search(p) => {
            TaskOutput::Records(search(&p.items, &p.search_term, &p.search_fields))
        }
        TaskRequest::HotelSearch(p) => TaskOutput::HotelSearch(hotel_search(&p.hotels, &p.filters)),
        TaskRequest::Analytics(p) => TaskOutput::Analytics(analytics(&p.bookings, &p.filters)?),
        TaskRequest::Earnings(p) => TaskOutput::Earnings(earnings(&p.bookings, &p.filters)?),
        TaskRequest::Revenue(p) => TaskOutput::Revenue(revenue(&p.bookings, &p.filters)?),
        TaskRequest::CalculateStats(p) => {
            TaskOutput::Stats(dashboard_stats(&p.hotels, &p.bookings, p.as_of))
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BookingFilters, BookingsPayload, SortOrder};
    use serde_json::json;

    #[test]
    fn test_run_sort() {
        let data = vec![json!(5), json!(3), json!(1), json!(4), json!(2)];
        let output = run(&TaskRequest::sort(data, "", SortOrder::Asc)).unwrap();
        assert_eq!(
            output,
            TaskOutput::Records(vec![json!(1), json!(2), json!(3), json!(4), json!(5)])
        );
    }

    #[test]
    fn test_run_propagates_invalid_bounds() {
        let request = TaskRequest::Analytics(BookingsPayload {
            bookings: vec![json!({"status": "COMPLETED"})],
            filters: BookingFilters {
                start_date: Some("last tuesday".to_string()),
                ..Default::default()
            },
        });
        assert!(matches!(run(&request), Err(CoreError::InvalidInput(_))));
    }
}
