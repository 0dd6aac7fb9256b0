//! HTML extraction for the member site
//!
//! Pure functions over page bodies: the anti-forgery token on the login form,
//! the member id on the profile page, the last trip page number, and trip rows.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::models::{StationIndex, Trip};
use crate::parser::selectors::{token_input, ProfileSelectors, TripSelectors};
use crate::utils::error::ParseError;
use crate::utils::normalize_whitespace;

/// Timestamp format used in trip rows, e.g. `06/01/2015 08:00:00 AM`
const TRIP_TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Text of the pagination link pointing at the oldest trips
const OLDEST_LINK_TEXT: &str = "Oldest";

/// Read the anti-forgery token from the login form's hidden input
pub fn extract_token(html: &str, field: &str) -> Result<String, ParseError> {
    let selector = token_input(field).ok_or(ParseError::TokenNotFound)?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|input| input.value().attr("value"))
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ParseError::TokenNotFound)
}

/// Read the member id from the first profile link carrying `memberId=`
pub fn extract_member_id(html: &str) -> Result<String, ParseError> {
    static MEMBER_ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = MEMBER_ID_RE.get_or_init(|| Regex::new(r"memberId=([^&]+)").expect("Invalid regex"));

    let selectors = ProfileSelectors::new();
    let document = Html::parse_document(html);

    document
        .select(selectors.member_id_link)
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| re.captures(href).map(|caps| caps[1].to_string()))
        .ok_or(ParseError::MemberIdNotFound)
}

/// Read the page number behind the "Oldest" pagination link
///
/// Returns `None` when the history has no pagination.
pub fn extract_last_page(html: &str) -> Option<u32> {
    static PAGE_RE: OnceLock<Regex> = OnceLock::new();
    let re = PAGE_RE.get_or_init(|| Regex::new(r"pageNumber=(\d+)").expect("Invalid regex"));

    let selectors = ProfileSelectors::new();
    let document = Html::parse_document(html);

    document
        .select(selectors.page_link)
        .filter(|link| normalize_whitespace(&link.text().collect::<String>()) == OLDEST_LINK_TEXT)
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| re.captures(href).and_then(|caps| caps[1].parse().ok()))
}

/// Parse a duration cell like `1 h 2 min 3 s` or `12 min 0 s` into seconds
pub fn parse_duration(text: &str) -> Option<u32> {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = DURATION_RE.get_or_init(|| {
        Regex::new(r"^(?:(\d+) h )?(\d+) min (\d+) s").expect("Invalid regex")
    });

    let caps = re.captures(text.trim())?;
    let hours: u32 = caps.get(1).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: u32 = caps.get(3)?.as_str().parse().ok()?;

    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Parse a trip timestamp rendered in the site's local timezone
///
/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant;
/// times inside a DST gap do not exist and yield `None`.
pub fn parse_trip_time(text: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TRIP_TIME_FORMAT).ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

/// Trip history page parser
#[derive(Clone)]
pub struct TripParser {
    selectors: TripSelectors,
    tz: Tz,
}

impl TripParser {
    #[must_use]
    pub fn new(tz: Tz) -> Self {
        Self {
            selectors: TripSelectors::new(),
            tz,
        }
    }

    /// Parse every trip row of a history page
    ///
    /// Rows that are not real rides (no elapsed time, unparsable duration or
    /// start) are skipped.
    ///
    /// # Errors
    /// Returns `ParseError::NoTripRows` if the page has no trip rows at all
    pub fn parse_page(&self, html: &str, stations: &StationIndex) -> Result<Vec<Trip>, ParseError> {
        let document = Html::parse_document(html);
        let rows: Vec<ElementRef<'_>> = document.select(self.selectors.row).collect();

        if rows.is_empty() {
            return Err(ParseError::NoTripRows);
        }

        Ok(rows
            .into_iter()
            .filter_map(|row| self.parse_row(row, stations))
            .collect())
    }

    fn parse_row(&self, row: ElementRef<'_>, stations: &StationIndex) -> Option<Trip> {
        let duration_text = cell_text(row, self.selectors.duration)?;
        let duration = match parse_duration(&duration_text) {
            Some(secs) if secs > 0 => secs,
            _ => {
                tracing::trace!(duration = %duration_text, "Skipping row without elapsed time");
                return None;
            }
        };

        let start_name = cell_text(row, self.selectors.start_station)?;
        let Some(start_station) = stations.id_for_name(&start_name) else {
            tracing::warn!(station = %start_name, "Skipping trip from unknown station");
            return None;
        };

        let start_text = cell_text(row, self.selectors.start_date)?;
        let Some(start_time) = parse_trip_time(&start_text, self.tz) else {
            tracing::warn!(start = %start_text, "Skipping trip with unparsable start time");
            return None;
        };

        let end_station = cell_text(row, self.selectors.end_station)
            .and_then(|name| stations.id_for_name(&name));
        let end_time = cell_text(row, self.selectors.end_date)
            .and_then(|text| parse_trip_time(&text, self.tz));

        Some(Trip::new(
            start_station,
            start_time,
            end_station,
            end_time,
            Some(duration),
        ))
    }
}

fn cell_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let text = normalize_whitespace(&row.select(selector).next()?.text().collect::<String>());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
