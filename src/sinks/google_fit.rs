//! Google Fit sink
//!
//! Rides are written twice: as a distance point in a dedicated raw data
//! source, and as a biking session covering the same interval. The data
//! source is looked up by stream name and created on first use.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::GoogleFitConfig;
use crate::error::{Error, Result};
use crate::models::Trip;
use crate::sinks::{http_client, reject_unless_success, FitnessSink};

const PROVIDER: &str = "google_fit";

const DISTANCE_DATA_TYPE: &str = "com.google.distance.delta";
const APPLICATION_NAME: &str = "citifit";

/// Google Fit activity type for biking
const ACTIVITY_BIKING: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceList {
    #[serde(default)]
    data_source: Vec<DataSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSource {
    data_stream_id: String,
    #[serde(default)]
    data_stream_name: Option<String>,
}

/// Writes rides to Google Fit as distance data plus a biking session
pub struct GoogleFitSink {
    client: Client,
    api_base: Url,
    access_token: String,
    data_stream_name: String,
    data_source_id: Option<String>,
}

impl GoogleFitSink {
    pub fn new(config: &GoogleFitConfig, access_token: &str) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| Error::config(format!("google_fit.api_base: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(Error::config("google_fit.api_base cannot be a base URL"));
        }

        Ok(Self {
            client: http_client()?,
            api_base,
            access_token: access_token.to_string(),
            data_stream_name: config.data_stream_name.clone(),
            data_source_id: None,
        })
    }

    /// Data source id resolved by [`FitnessSink::provision`]
    pub fn data_source_id(&self) -> Option<&str> {
        self.data_source_id.as_deref()
    }

    /// `{api_base}/users/me/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("users").push("me").extend(segments);
        }
        url
    }

    async fn find_data_source(&self) -> std::result::Result<Option<String>, String> {
        let mut url = self.endpoint(&["dataSources"]);
        url.query_pairs_mut()
            .append_pair("dataTypeName", DISTANCE_DATA_TYPE);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let list: DataSourceList = reject_unless_success(response)
            .await?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        Ok(list
            .data_source
            .into_iter()
            .find(|source| source.data_stream_name.as_deref() == Some(self.data_stream_name.as_str()))
            .map(|source| source.data_stream_id))
    }

    async fn create_data_source(&self) -> std::result::Result<String, String> {
        let body = json!({
            "dataStreamName": self.data_stream_name,
            "type": "raw",
            "application": { "name": APPLICATION_NAME },
            "dataType": {
                "name": DISTANCE_DATA_TYPE,
                "field": [{ "name": "distance", "format": "floatPoint" }],
            },
        });

        let response = self
            .client
            .post(self.endpoint(&["dataSources"]))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let created: DataSource = reject_unless_success(response)
            .await?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        Ok(created.data_stream_id)
    }
}

#[async_trait]
impl FitnessSink for GoogleFitSink {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn provision(&mut self) -> Result<()> {
        let existing = self
            .find_data_source()
            .await
            .map_err(|reason| Error::provisioning(PROVIDER, reason))?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id = self
                    .create_data_source()
                    .await
                    .map_err(|reason| Error::provisioning(PROVIDER, reason))?;
                tracing::info!(data_source = %id, "Created Google Fit distance data source");
                id
            }
        };

        self.data_source_id = Some(id);
        Ok(())
    }

    async fn add_trip(&self, trip: &Trip, distance_meters: u32) -> Result<()> {
        let source_id = self
            .data_source_id
            .as_deref()
            .ok_or_else(|| Error::submission(PROVIDER, "sink not provisioned"))?;

        let start = trip.start_utc();
        let end = trip.end_utc();
        let start_ns = start.timestamp_nanos_opt().unwrap_or_default();
        let end_ns = end.timestamp_nanos_opt().unwrap_or_default();
        let dataset_id = format!("{start_ns}-{end_ns}");

        let dataset = json!({
            "dataSourceId": source_id,
            "minStartTimeNs": start_ns.to_string(),
            "maxEndTimeNs": end_ns.to_string(),
            "point": [{
                "dataTypeName": DISTANCE_DATA_TYPE,
                "startTimeNanos": start_ns.to_string(),
                "endTimeNanos": end_ns.to_string(),
                "value": [{ "fpVal": f64::from(distance_meters) }],
            }],
        });

        let response = self
            .client
            .patch(self.endpoint(&["dataSources", source_id, "datasets", &dataset_id]))
            .bearer_auth(&self.access_token)
            .json(&dataset)
            .send()
            .await
            .map_err(|e| Error::submission(PROVIDER, e))?;
        reject_unless_success(response)
            .await
            .map_err(|reason| Error::submission(PROVIDER, reason))?;

        let session_id = format!("{APPLICATION_NAME}-{}", trip.id);
        let session = json!({
            "id": session_id,
            "name": "Bike ride",
            "startTimeMillis": start.timestamp_millis().to_string(),
            "endTimeMillis": end.timestamp_millis().to_string(),
            "activityType": ACTIVITY_BIKING,
            "application": { "name": APPLICATION_NAME },
        });

        let response = self
            .client
            .put(self.endpoint(&["sessions", &session_id]))
            .bearer_auth(&self.access_token)
            .json(&session)
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
