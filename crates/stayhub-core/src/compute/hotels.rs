//! Hotel listing search.

use serde_json::Value;

use super::value::{as_number, money, str_field, values_equal};
use crate::{HotelFilters, HotelSearchResult};

const TEXT_FIELDS: [&str; 4] = ["name", "description", "city", "address"];

/// Narrow a hotel listing by the given criteria.
///
/// Criteria run in a fixed order (text, price, stars, amenities,
/// availability); a criterion is reported in `matched_fields` when at least
/// one hotel passed it.
pub fn hotel_search(hotels: &[Value], filters: &HotelFilters) -> HotelSearchResult {
    let mut remaining: Vec<&Value> = hotels.iter().collect();
    let mut matched_fields = Vec::new();

    if let Some(query) = filters.query.as_deref().filter(|q| !q.is_empty()) {
        let needle = query.to_lowercase();
        apply_stage(&mut remaining, &mut matched_fields, "text", |hotel| {
            matches_text(hotel, &needle)
        });
    }

    if filters.min_price.is_some() || filters.max_price.is_some() {
        apply_stage(&mut remaining, &mut matched_fields, "price", |hotel| {
            let price = money(hotel.get("minPrice"));
            filters.min_price.map_or(true, |min| price >= min)
                && filters.max_price.map_or(true, |max| price <= max)
        });
    }

    if let Some(stars) = filters.stars.as_ref().filter(|s| !s.is_empty()) {
        apply_stage(&mut remaining, &mut matched_fields, "stars", |hotel| {
            hotel
                .get("starRating")
                .map_or(false, |rating| stars.iter().any(|s| values_equal(s, rating)))
        });
    }

    if let Some(amenities) = filters.amenities.as_ref().filter(|a| !a.is_empty()) {
        apply_stage(&mut remaining, &mut matched_fields, "amenities", |hotel| {
            let have = amenity_ids(hotel);
            amenities
                .iter()
                .all(|wanted| have.iter().any(|id| values_equal(id, wanted)))
        });
    }

    if filters.check_in.is_some() && filters.check_out.is_some() {
        let guests = f64::from(filters.guests.unwrap_or(1));
        apply_stage(&mut remaining, &mut matched_fields, "availability", |hotel| {
            has_room_for(hotel, guests)
        });
    }

    let hotels: Vec<Value> = remaining.into_iter().cloned().collect();
    HotelSearchResult {
        count: hotels.len(),
        hotels,
        matched_fields,
    }
}

fn apply_stage(
    remaining: &mut Vec<&Value>,
    matched_fields: &mut Vec<String>,
    name: &str,
    keep: impl Fn(&Value) -> bool,
) {
    remaining.retain(|hotel| keep(*hotel));
    if !remaining.is_empty() {
        matched_fields.push(name.to_string());
    }
}

fn matches_text(hotel: &Value, needle: &str) -> bool {
    TEXT_FIELDS
        .iter()
        .filter_map(|field| str_field(hotel, field))
        .any(|text| text.to_lowercase().contains(needle))
}

/// Amenity ids of a hotel; entries may be bare ids or `{id, ...}` objects.
fn amenity_ids(hotel: &Value) -> Vec<&Value> {
    hotel
        .get("amenities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.get("id").unwrap_or(item))
                .collect()
        })
        .unwrap_or_default()
}

/// A hotel without a room list is assumed bookable.
fn has_room_for(hotel: &Value, guests: f64) -> bool {
    let Some(rooms) = hotel.get("rooms").and_then(Value::as_array) else {
        return true;
    };
    rooms.iter().any(|room| {
        let capacity = room.get("capacity").and_then(as_number).unwrap_or(0.0);
        if capacity > 0.0 && capacity < guests {
            return false;
        }
        room.get("isAvailable") != Some(&Value::Bool(false))
    })
}
