//! Bicycling distance between stations via a directions service
//!
//! One request per imported trip; results are not cached.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::DirectionsConfig;
use crate::error::{Error, Result};
use crate::models::Coordinates;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TRAVEL_MODE: &str = "bicycling";
const UNIT_SYSTEM: &str = "metric";

/// Resolves the riding distance between two points
#[async_trait]
pub trait DistanceResolver: Send + Sync {
    /// Distance in meters
    async fn distance(&self, origin: Coordinates, destination: Coordinates) -> Result<u32>;
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    distance: TextValue,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: u32,
}

impl DirectionsResponse {
    fn into_distance(self) -> Result<u32> {
        if self.status != "OK" {
            return Err(Error::DirectionsUnavailable {
                status: self.status,
                message: self.error_message.unwrap_or_default(),
            });
        }

        self.routes
            .into_iter()
            .next()
            .and_then(|route| route.legs.into_iter().next())
            .map(|leg| leg.distance.value)
            .ok_or_else(|| Error::DirectionsUnavailable {
                status: "NO_ROUTE".to_string(),
                message: "directions reply contained no route".to_string(),
            })
    }
}

/// Google Directions API client
pub struct DirectionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl DirectionsClient {
    /// Create a client asking for bicycling routes in metric units
    pub fn new(config: &DirectionsConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl DistanceResolver for DirectionsClient {
    async fn distance(&self, origin: Coordinates, destination: Coordinates) -> Result<u32> {
        let origin = origin.to_string();
        let destination = destination.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("origin", origin.as_str()),
                ("destination", destination.as_str()),
                ("mode", TRAVEL_MODE),
                ("units", UNIT_SYSTEM),
            ])
            .send()
            .await
            .map_err(|e| Error::DirectionsUnavailable {
                status: "REQUEST_FAILED".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DirectionsUnavailable {
                status: format!("HTTP_{}", status.as_u16()),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: DirectionsResponse = response.json().await.map_err(|e| {
            Error::DirectionsUnavailable {
                status: "INVALID_RESPONSE".to_string(),
                message: e.to_string(),
            }
        })?;

        let meters = body.into_distance()?;
        tracing::debug!(%origin, %destination, meters, "Resolved ride distance");
        Ok(meters)
    }
}
