// Core data structures shared by the source client, sync engine and sinks

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trip identifier: UTC epoch seconds of the trip start time.
///
/// Monotonically non-decreasing with start time for a given account, but two
/// trips starting in the same second share an id.
pub type TripId = i64;

/// Station identifier as published by the bike-share station feed
pub type StationId = u32;

/// Account identifier in the account store
pub type AccountId = i64;

/// Latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Bike-share station and its status at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_docks: u32,
    pub available_bikes: u32,
    pub available_docks: u32,
}

impl Station {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

/// Station roster indexed by id and by name
///
/// Built fresh for every synchronization run.
#[derive(Debug, Clone, Default)]
pub struct StationIndex {
    by_id: HashMap<StationId, Station>,
    by_name: HashMap<String, StationId>,
}

impl StationIndex {
    pub fn new(stations: Vec<Station>) -> Self {
        let mut by_id = HashMap::with_capacity(stations.len());
        let mut by_name = HashMap::with_capacity(stations.len());
        for station in stations {
            by_name.insert(station.name.clone(), station.id);
            by_id.insert(station.id, station);
        }
        Self { by_id, by_name }
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.by_id.get(&id)
    }

    pub fn id_for_name(&self, name: &str) -> Option<StationId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A member's rental from one station to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub start_station: StationId,
    pub start_time: DateTime<FixedOffset>,
    /// Absent for in-progress or cancelled rentals
    pub end_station: Option<StationId>,
    pub end_time: Option<DateTime<FixedOffset>>,
    /// Elapsed time in seconds
    pub duration: Option<u32>,
}

impl Trip {
    /// Build a trip whose id is derived from its start time
    pub fn new(
        start_station: StationId,
        start_time: DateTime<FixedOffset>,
        end_station: Option<StationId>,
        end_time: Option<DateTime<FixedOffset>>,
        duration: Option<u32>,
    ) -> Self {
        Self {
            id: start_time.timestamp(),
            start_station,
            start_time,
            end_station,
            end_time,
            duration,
        }
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start_time.with_timezone(&Utc)
    }

    /// End of the trip, falling back to start + duration when the end
    /// timestamp was not published
    pub fn end_utc(&self) -> DateTime<Utc> {
        match self.end_time {
            Some(end) => end.with_timezone(&Utc),
            None => self.start_utc() + Duration::seconds(i64::from(self.duration.unwrap_or(0))),
        }
    }
}

/// Credentials for one destination fitness provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum FitnessCredentials {
    Fitbit { access_token: String },
    GoogleFit { access_token: String },
}

impl FitnessCredentials {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Fitbit { .. } => "fitbit",
            Self::GoogleFit { .. } => "google_fit",
        }
    }
}

/// Bike-share username/password pair
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account record linking a bike-share login to fitness providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub source: Option<SourceCredentials>,
    pub fitness: Vec<FitnessCredentials>,
    /// Id of the last trip imported into every configured sink
    pub watermark: TripId,
    pub locked: bool,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            source: None,
            fitness: Vec::new(),
            watermark: 0,
            locked: false,
        }
    }
}
