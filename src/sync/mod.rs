//! Trip selection and the per-account synchronization run

pub mod filter;
pub mod orchestrator;

pub use filter::{select, MIN_TRIP_DURATION_SECS};
pub use orchestrator::{Orchestrator, RunReport};
