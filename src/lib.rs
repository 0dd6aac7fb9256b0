//! citifit - Bike-share trip synchronization engine
//!
//! Scrapes a member's trip history from the Citi Bike member site and logs
//! each new ride as a workout in the member's fitness providers, tracking a
//! per-account watermark so no ride is ever submitted twice.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`source`] - Session-authenticated scraping client with retries
//! - [`parser`] - HTML and JSON extraction for the member site
//! - [`models`] - Core data structures and types
//! - [`sync`] - Trip selection and the per-account synchronization run
//! - [`directions`] - Bicycling distance between stations
//! - [`sinks`] - Fitness providers (Fitbit, Google Fit)
//! - [`storage`] - Account records, watermarks and update locks
//! - [`coordinator`] - Per-account locking and task dispatch
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use citifit::config::Config;
//! use citifit::coordinator::{LiveSyncRunner, UpdateCoordinator};
//! use citifit::storage::SqliteAccountRepository;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repo = Arc::new(SqliteAccountRepository::new(&config.database.sqlite_path)?);
//!     let coordinator = UpdateCoordinator::new(repo, Arc::new(LiveSyncRunner::new(config)));
//!     coordinator.trigger_all()?.join().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod directions;
pub mod error;
pub mod models;
pub mod parser;
pub mod sinks;
pub mod source;
pub mod storage;
pub mod sync;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{LiveSyncRunner, SyncRunner, UpdateCoordinator};
    pub use crate::directions::{DirectionsClient, DistanceResolver};
    pub use crate::error::{CitifitErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{Account, FitnessCredentials, Station, Trip, TripId};
    pub use crate::sinks::FitnessSink;
    pub use crate::source::{SourceClient, TripSource};
    pub use crate::storage::{AccountRepository, SqliteAccountRepository};
    pub use crate::sync::{select, Orchestrator, RunReport};
}

// Direct re-exports for convenience
pub use models::{Account, Station, Trip};
