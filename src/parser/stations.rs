//! Station feed (JSON) decoding

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::Station;
use crate::utils::error::ParseError;

#[derive(Debug, Deserialize)]
struct StationFeed {
    #[serde(rename = "stationBeanList", default)]
    station_bean_list: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStation {
    #[serde(deserialize_with = "lenient_count")]
    id: u32,
    station_name: String,
    #[serde(deserialize_with = "lenient_coordinate")]
    latitude: f64,
    #[serde(deserialize_with = "lenient_coordinate")]
    longitude: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    total_docks: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    available_bikes: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    available_docks: u32,
}

impl From<RawStation> for Station {
    fn from(raw: RawStation) -> Self {
        Self {
            id: raw.id,
            name: raw.station_name.trim().to_string(),
            lat: raw.latitude,
            lng: raw.longitude,
            total_docks: raw.total_docks,
            available_bikes: raw.available_bikes,
            available_docks: raw.available_docks,
        }
    }
}

// The feed has served numbers both bare and quoted

fn lenient_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected number, got {other}"
        ))),
    }
}

/// Non-negative whole number; fractions and negatives are rejected
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected integer, got {other}"
        ))),
    }
}

/// Decode the station status feed
///
/// # Errors
/// Returns `ParseError::MalformedStations` if the body is not the expected
/// JSON or lists no stations
pub fn parse_stations(body: &str) -> Result<Vec<Station>, ParseError> {
    let feed: StationFeed =
        serde_json::from_str(body).map_err(|e| ParseError::MalformedStations(e.to_string()))?;

    if feed.station_bean_list.is_empty() {
        return Err(ParseError::MalformedStations(
            "stationBeanList is empty".to_string(),
        ));
    }

    Ok(feed.station_bean_list.into_iter().map(Station::from).collect())
}
