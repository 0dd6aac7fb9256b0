//! Fitness providers receiving imported rides
//!
//! Every provider implements [`FitnessSink`]; the orchestrator provisions all
//! of an account's sinks once per run and then fans each trip out to them in
//! order.

pub mod fitbit;
pub mod google_fit;

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::models::{FitnessCredentials, Trip};

pub use fitbit::FitbitSink;
pub use google_fit::GoogleFitSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A destination fitness provider
#[async_trait]
pub trait FitnessSink: Send + Sync {
    /// Provider name used in logs and errors
    fn provider(&self) -> &'static str;

    /// Prepare provider-side state needed before any trip can be added
    ///
    /// # Errors
    /// `SinkProvisioningFailed` if the provider cannot be prepared
    async fn provision(&mut self) -> Result<()>;

    /// Record one ride
    ///
    /// # Errors
    /// `SinkSubmissionFailed` on any upstream rejection
    async fn add_trip(&self, trip: &Trip, distance_meters: u32) -> Result<()>;
}

/// Build one sink per credential entry of an account
pub fn build_sinks(
    config: &Config,
    credentials: &[FitnessCredentials],
) -> Result<Vec<Box<dyn FitnessSink>>> {
    credentials
        .iter()
        .map(|creds| -> Result<Box<dyn FitnessSink>> {
            match creds {
                FitnessCredentials::Fitbit { access_token } => {
                    Ok(Box::new(FitbitSink::new(&config.fitbit, access_token)?))
                }
                FitnessCredentials::GoogleFit { access_token } => {
                    Ok(Box::new(GoogleFitSink::new(&config.google_fit, access_token)?))
                }
            }
        })
        .collect()
}

pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Turn a non-success response into a readable rejection reason
pub(crate) async fn reject_unless_success(response: Response) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("HTTP {}: {}", status.as_u16(), body.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sinks_per_credential() {
        let config = Config::default();
        let creds = vec![
            FitnessCredentials::Fitbit {
                access_token: "fb".to_string(),
            },
            FitnessCredentials::GoogleFit {
                access_token: "gf".to_string(),
            },
        ];
        let sinks = build_sinks(&config, &creds).unwrap();
        let providers: Vec<&str> = sinks.iter().map(|s| s.provider()).collect();
        assert_eq!(providers, vec!["fitbit", "google_fit"]);

        assert!(build_sinks(&config, &[]).unwrap().is_empty());
    }
}
