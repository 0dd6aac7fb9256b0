//! Unified error handling for the citifit crate
//!
//! The [`Error`] enum carries the synchronization error taxonomy
//! (authentication, upstream scraping, directions, sink provisioning and
//! submission, logged-out) alongside the ambient storage/config failures.
//!
//! # Usage
//!
//! ```rust,ignore
//! use citifit::error::{CitifitErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "Will retry on next scheduled run");
//!     } else {
//!         tracing::error!(error = %err, "Needs operator attention");
//!     }
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::utils::error::{FetchError, ParseError};

use crate::models::AccountId;

/// Common trait for citifit error types
pub trait CitifitErrorTrait: std::error::Error {
    /// Check if this error is transient (the next scheduled run may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bike-share site or directions service unreachable/misbehaving
    Network,
    /// Credentials rejected or missing
    Authentication,
    /// Fitness provider rejected provisioning or a submission
    Provider,
    /// Account store errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::Provider => "provider",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Source client step that exhausted its retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStep {
    Token,
    Login,
    MemberId,
    LastPage,
    TripPage(u32),
    Stations,
}

impl fmt::Display for SourceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "token fetch"),
            Self::Login => write!(f, "login"),
            Self::MemberId => write!(f, "member id resolution"),
            Self::LastPage => write!(f, "last page discovery"),
            Self::TripPage(page) => write!(f, "trip page {page} fetch"),
            Self::Stations => write!(f, "station fetch"),
        }
    }
}

/// Unified error type for the citifit crate
#[derive(Error, Debug)]
pub enum Error {
    /// Bike-share credentials rejected after all retries
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Bike-share site unavailable or unparsable after all retries
    #[error("Upstream unavailable during {step}: {reason}")]
    UpstreamUnavailable { step: SourceStep, reason: String },

    /// Directions service returned a non-success status
    #[error("Directions unavailable: {status}: {message}")]
    DirectionsUnavailable { status: String, message: String },

    /// A fitness sink could not be prepared for the run
    #[error("Provisioning {provider} failed: {reason}")]
    SinkProvisioningFailed { provider: String, reason: String },

    /// A fitness sink rejected a workout
    #[error("Submitting to {provider} failed: {reason}")]
    SinkSubmissionFailed { provider: String, reason: String },

    /// Authenticated operation attempted with no credentials configured
    #[error("No bike-share credentials configured")]
    LoggedOut,

    /// Account does not exist in the store
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CitifitErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { .. }
            | Self::DirectionsUnavailable { .. }
            | Self::SinkSubmissionFailed { .. }
            | Self::Http(_)
            | Self::Io(_) => true,
            // Provider outages look the same as bad tokens from here
            Self::SinkProvisioningFailed { .. } => true,
            Self::AuthenticationFailed { .. }
            | Self::LoggedOut
            | Self::AccountNotFound(_)
            | Self::Database(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamUnavailable { .. } | Self::DirectionsUnavailable { .. } | Self::Http(_) => {
                ErrorCategory::Network
            }
            Self::AuthenticationFailed { .. } | Self::LoggedOut => ErrorCategory::Authentication,
            Self::SinkProvisioningFailed { .. } | Self::SinkSubmissionFailed { .. } => {
                ErrorCategory::Provider
            }
            Self::AccountNotFound(_) | Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create an upstream error for a source step
    pub fn upstream(step: SourceStep, reason: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            step,
            reason: reason.to_string(),
        }
    }

    /// Create a sink provisioning error
    pub fn provisioning(provider: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SinkProvisioningFailed {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a sink submission error
    pub fn submission(provider: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::SinkSubmissionFailed {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
