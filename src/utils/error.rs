//! Low-level error types for the bike-share scraping client
//!
//! These stay inside the source client; once a step exhausts its retries they
//! are folded into [`crate::error::Error::UpstreamUnavailable`].

use thiserror::Error;

/// Errors that can occur during a single HTTP exchange
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// The site served its login page instead of the requested one
    #[error("Session logged out")]
    LoggedOut,

    /// The site redirected somewhere other than the expected page
    #[error("Unexpected landing URL: {0}")]
    UnexpectedUrl(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Build from a reqwest error, keeping timeouts distinguishable
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Errors that can occur while extracting data from fetched pages
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Anti-forgery token not present on the login page
    #[error("Login token not found")]
    TokenNotFound,

    /// Member id link not present on the profile page
    #[error("Member id not found")]
    MemberIdNotFound,

    /// Trip history page contained no trip rows
    #[error("No trips found on page")]
    NoTripRows,

    /// Station feed missing or empty
    #[error("Station feed malformed: {0}")]
    MalformedStations(String),
}
