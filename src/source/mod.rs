//! Bike-share trip source
//!
//! - [`fetcher`] - cookie-jar HTTP session with rate limiting
//! - [`session`] - login state machine
//! - [`client`] - login, station roster and paginated trip history

pub mod client;
pub mod fetcher;
pub mod session;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Station, Trip, TripId};

pub use client::SourceClient;
pub use fetcher::{Page, SiteFetcher};
pub use session::SessionState;

/// Where trips and stations come from
///
/// Implemented by [`SourceClient`] for the live site; the sync engine only
/// depends on this trait.
#[async_trait]
pub trait TripSource: Send {
    /// Establish a session; a no-op when already authenticated
    async fn authenticate(&mut self) -> Result<()>;

    /// Fetch the current station roster (no authentication needed)
    async fn stations(&mut self) -> Result<Vec<Station>>;

    /// Trips with id greater than `min_id`, newest first
    async fn trips(&mut self, min_id: TripId) -> Result<Vec<Trip>>;
}
