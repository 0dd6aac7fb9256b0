//! Trip filter and sequencer

use crate::models::{Trip, TripId};

/// Shorter rentals are treated as dock-and-redock rather than rides
pub const MIN_TRIP_DURATION_SECS: u32 = 60;

/// Select the trips worth importing, oldest first
///
/// Keeps trips newer than `min_id` that ended at a different station than
/// they started from and lasted at least [`MIN_TRIP_DURATION_SECS`]. The
/// sort is stable, so trips sharing an id keep their scraped order.
pub fn select(trips: Vec<Trip>, min_id: TripId) -> Vec<Trip> {
    let mut selected: Vec<Trip> = trips
        .into_iter()
        .filter(|trip| is_importable(trip, min_id))
        .collect();

    selected.sort_by_key(|trip| trip.id);
    selected
}

fn is_importable(trip: &Trip, min_id: TripId) -> bool {
    if trip.id <= min_id {
        return false;
    }

    let Some(end_station) = trip.end_station else {
        return false;
    };
    if end_station == trip.start_station {
        return false;
    }

    trip.duration
        .is_some_and(|secs| secs >= MIN_TRIP_DURATION_SECS)
}
