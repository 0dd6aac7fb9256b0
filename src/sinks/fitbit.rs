//! Fitbit activity log sink

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::FitbitConfig;
use crate::error::{Error, Result};
use crate::models::Trip;
use crate::sinks::{http_client, reject_unless_success, FitnessSink};

const PROVIDER: &str = "fitbit";

const CATEGORY: &str = "Sports and Workouts";
const SUBCATEGORY: &str = "Bicycling";
const ACTIVITY: &str = "Bike";

#[derive(Debug, Deserialize)]
struct ActivityCatalog {
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Category {
    name: String,
    #[serde(default)]
    sub_categories: Vec<Category>,
    #[serde(default)]
    activities: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
struct Activity {
    id: u64,
    name: String,
}

impl ActivityCatalog {
    /// Id of the "Bike" activity under Sports and Workouts > Bicycling
    fn biking_activity_id(&self) -> Option<u64> {
        self.categories
            .iter()
            .filter(|c| c.name == CATEGORY)
            .flat_map(|c| c.sub_categories.iter())
            .filter(|s| s.name == SUBCATEGORY)
            .flat_map(|s| s.activities.iter())
            .find(|a| a.name == ACTIVITY)
            .map(|a| a.id)
    }
}

/// Logs rides as Fitbit "Bike" activities
pub struct FitbitSink {
    client: Client,
    api_base: String,
    access_token: String,
    activity_id: Option<u64>,
}

impl FitbitSink {
    pub fn new(config: &FitbitConfig, access_token: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            activity_id: None,
        })
    }

    /// Activity id resolved by [`FitnessSink::provision`]
    pub fn activity_id(&self) -> Option<u64> {
        self.activity_id
    }
}

#[async_trait]
impl FitnessSink for FitbitSink {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn provision(&mut self) -> Result<()> {
        let url = format!("{}/activities.json", self.api_base);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::provisioning(PROVIDER, e))?;
        let response = reject_unless_success(response)
            .await
            .map_err(|reason| Error::provisioning(PROVIDER, reason))?;

        let catalog: ActivityCatalog = response
            .json()
            .await
            .map_err(|e| Error::provisioning(PROVIDER, e))?;

        let activity_id = catalog
            .biking_activity_id()
            .ok_or_else(|| Error::provisioning(PROVIDER, "biking activity not in catalog"))?;

        tracing::debug!(activity_id, "Resolved Fitbit biking activity");
        self.activity_id = Some(activity_id);
        Ok(())
    }

    async fn add_trip(&self, trip: &Trip, distance_meters: u32) -> Result<()> {
        let activity_id = self
            .activity_id
            .ok_or_else(|| Error::submission(PROVIDER, "sink not provisioned"))?;

        let duration_millis = u64::from(trip.duration.unwrap_or(0)) * 1000;
        let form = [
            ("activityId", activity_id.to_string()),
            ("startTime", trip.start_time.format("%H:%M").to_string()),
            ("durationMillis", duration_millis.to_string()),
            ("date", trip.start_time.format("%Y-%m-%d").to_string()),
            ("distance", distance_meters.to_string()),
            ("distanceUnit", "Meter".to_string()),
        ];

        let url = format!("{}/user/-/activities.json", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::submission(PROVIDER, e))?;
        reject_unless_success(response)
            .await
            .map_err(|reason| Error::submission(PROVIDER, reason))?;

        tracing::info!(trip_id = trip.id, provider = PROVIDER, "Logged ride");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biking_activity_lookup() {
        let catalog: ActivityCatalog = serde_json::from_str(
            r#"{"categories":[
                {"name":"Dancing","activities":[{"id":1,"name":"Bike"}]},
                {"name":"Sports and Workouts","activities":[],"subCategories":[
                    {"name":"Running","activities":[{"id":2,"name":"Run"}]},
                    {"name":"Bicycling","activities":[
                        {"id":1071,"name":"Mountain biking"},
                        {"id":90001,"name":"Bike"}
                    ]}
                ]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(catalog.biking_activity_id(), Some(90001));
    }

    #[test]
    fn test_missing_activity() {
        let catalog: ActivityCatalog = serde_json::from_str(r#"{"categories":[]}"#).unwrap();
        assert_eq!(catalog.biking_activity_id(), None);
    }
}
