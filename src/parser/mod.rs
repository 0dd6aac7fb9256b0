//! HTML and JSON extraction for the bike-share member site
//!
//! - [`html`] - login token, member id, pagination and trip rows
//! - [`stations`] - station status feed
//! - [`selectors`] - compiled CSS selectors

pub mod html;
pub mod selectors;
pub mod stations;

pub use html::{
    extract_last_page, extract_member_id, extract_token, parse_duration, parse_trip_time,
    TripParser,
};
pub use stations::parse_stations;
