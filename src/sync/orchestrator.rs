//! One synchronization run for one account
//!
//! Steps, strictly in order:
//! 1. authenticate with the bike-share site and load the station roster
//! 2. provision every fitness sink, failing fast
//! 3. fetch trips newer than the watermark and select the importable ones
//! 4. per trip: resolve the distance, submit to every sink, advance the
//!    watermark; the first failure ends the run
//!
//! The watermark reached so far is reported even when the run fails, so the
//! caller can persist partial progress.

use std::time::Duration;

use crate::directions::DistanceResolver;
use crate::error::{Error, Result};
use crate::models::{StationIndex, Trip, TripId};
use crate::sinks::FitnessSink;
use crate::source::TripSource;
use crate::sync::filter::select;

/// Outcome of a run
#[derive(Debug)]
pub struct RunReport {
    /// Id of the last trip committed to every sink (the input watermark if
    /// none was)
    pub watermark: TripId,
    pub imported: usize,
    /// Trips skipped because a station is no longer in the roster
    pub skipped: usize,
    /// Error that ended the run early
    pub error: Option<Error>,
}

impl RunReport {
    pub fn new(watermark: TripId) -> Self {
        Self {
            watermark,
            imported: 0,
            skipped: 0,
            error: None,
        }
    }

    pub fn failed(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The new watermark, or the error that ended the run
    pub fn into_result(self) -> Result<TripId> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.watermark),
        }
    }
}

/// Sequential trip importer for one account
pub struct Orchestrator<S, D> {
    source: S,
    directions: D,
    sinks: Vec<Box<dyn FitnessSink>>,
    submission_delay: Duration,
}

impl<S: TripSource, D: DistanceResolver> Orchestrator<S, D> {
    pub fn new(source: S, directions: D, sinks: Vec<Box<dyn FitnessSink>>) -> Self {
        Self {
            source,
            directions,
            sinks,
            submission_delay: Duration::from_secs(1),
        }
    }

    /// Pause between successive trip submissions
    pub fn with_submission_delay(mut self, delay: Duration) -> Self {
        self.submission_delay = delay;
        self
    }

    /// Import every trip newer than `watermark`
    pub async fn run(&mut self, watermark: TripId) -> RunReport {
        let report = RunReport::new(watermark);

        let stations = match self.prepare().await {
            Ok(stations) => stations,
            Err(e) => return report.failed(e),
        };

        let trips = match self.source.trips(watermark).await {
            Ok(trips) => select(trips, watermark),
            Err(e) => return report.failed(e),
        };
        tracing::info!(count = trips.len(), watermark, "Trips selected for import");

        self.import(trips, &stations, report).await
    }

    async fn prepare(&mut self) -> Result<StationIndex> {
        self.source.authenticate().await?;
        let stations = StationIndex::new(self.source.stations().await?);
        tracing::debug!(count = stations.len(), "Loaded station roster");

        for sink in &mut self.sinks {
            sink.provision().await?;
            tracing::debug!(provider = sink.provider(), "Provisioned sink");
        }
        Ok(stations)
    }

    async fn import(
        &mut self,
        trips: Vec<Trip>,
        stations: &StationIndex,
        mut report: RunReport,
    ) -> RunReport {
        let mut first = true;

        for trip in &trips {
            let endpoints = trip
                .end_station
                .and_then(|end| Some((stations.get(trip.start_station)?, stations.get(end)?)));
            let Some((origin, destination)) = endpoints else {
                tracing::warn!(
                    trip_id = trip.id,
                    start_station = trip.start_station,
                    end_station = ?trip.end_station,
                    "Skipping trip with unknown station"
                );
                report.skipped += 1;
                continue;
            };

            if !first && !self.submission_delay.is_zero() {
                tokio::time::sleep(self.submission_delay).await;
            }
            first = false;

            let distance = match self
                .directions
                .distance(origin.coordinates(), destination.coordinates())
                .await
            {
                Ok(meters) => meters,
                Err(e) => {
                    tracing::warn!(trip_id = trip.id, error = %e, "Distance lookup failed");
                    return report.failed(e);
                }
            };

            for sink in &self.sinks {
                if let Err(e) = sink.add_trip(trip, distance).await {
                    tracing::warn!(trip_id = trip.id, provider = sink.provider(), error = %e, "Failed to add trip");
                    return report.failed(e);
                }
            }

            report.watermark = trip.id;
            report.imported += 1;
            tracing::debug!(trip_id = trip.id, distance, "Trip imported");
        }

        report
    }
}
