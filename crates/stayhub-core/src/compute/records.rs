//! Generic dataset operations: filter, sort, search.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::value::{as_number, compare_values, lookup, present, values_equal};
use crate::{FilterOptions, SortOrder};

/// Apply the search term, then field predicates, then the optional sort.
pub fn filter_and_sort(data: &[Value], options: &FilterOptions) -> Vec<Value> {
    let needle = options
        .search_term
        .as_deref()
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase);

    let mut filtered: Vec<Value> = data
        .iter()
        .filter(|record| match &needle {
            Some(needle) => any_string_field_contains(record, needle),
            None => true,
        })
        .filter(|record| match &options.filters {
            Some(predicates) => matches_predicates(record, predicates),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(sort_by) = &options.sort_by {
        sort_in_place(
            &mut filtered,
            sort_by,
            options.sort_order.unwrap_or_default(),
        );
    }
    filtered
}

/// Stable sort by `sort_by`. Records without the field always go last.
pub fn sort(data: &[Value], sort_by: &str, order: SortOrder) -> Vec<Value> {
    let mut sorted = data.to_vec();
    sort_in_place(&mut sorted, sort_by, order);
    sorted
}

/// Records where any of `fields` contains `term`.
///
/// Strings match case-insensitively; numbers match on their decimal text.
pub fn search(items: &[Value], term: &str, fields: &[String]) -> Vec<Value> {
    let needle = term.to_lowercase();
    items
        .iter()
        .filter(|item| {
            fields.iter().any(|field| match present(item, field) {
                Some(Value::String(s)) => s.to_lowercase().contains(&needle),
                Some(Value::Number(n)) => n.to_string().contains(term),
                _ => false,
            })
        })
        .cloned()
        .collect()
}

fn sort_in_place(records: &mut [Value], sort_by: &str, order: SortOrder) {
    records.sort_by(|a, b| match (present(a, sort_by), present(b, sort_by)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => order.apply(compare_values(x, y)),
    });
}

fn any_string_field_contains(record: &Value, needle: &str) -> bool {
    record.as_object().map_or(false, |fields| {
        fields
            .values()
            .filter_map(Value::as_str)
            .any(|s| s.to_lowercase().contains(needle))
    })
}

fn matches_predicates(record: &Value, predicates: &Map<String, Value>) -> bool {
    predicates
        .iter()
        .all(|(field, expected)| matches_predicate(lookup(record, field), expected))
}

fn matches_predicate(actual: Option<&Value>, expected: &Value) -> bool {
    match expected {
        Value::Null => true,
        Value::String(s) if s.is_empty() => true,
        // Every listed value must be present.
        Value::Array(wanted) => wanted.iter().all(|w| match actual {
            Some(Value::Array(have)) => have.iter().any(|h| values_equal(h, w)),
            Some(have) => values_equal(have, w),
            None => false,
        }),
        Value::Object(range) if range.contains_key("min") || range.contains_key("max") => {
            let Some(n) = actual.and_then(as_number) else {
                return false;
            };
            let above_min = range
                .get("min")
                .and_then(as_number)
                .map_or(true, |min| n >= min);
            let below_max = range
                .get("max")
                .and_then(as_number)
                .map_or(true, |max| n <= max);
            above_min && below_max
        }
        _ => actual.map_or(false, |have| values_equal(have, expected)),
    }
}
