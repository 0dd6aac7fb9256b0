//! CSS selectors for the bike-share member site
//!
//! Compiled once; the markup they target is the member profile, login form and
//! trip history table.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref MEMBER_ID_LINK: Selector = parse_selector!(r#"a[href*="memberId"]"#);

    static ref PAGE_LINK: Selector = parse_selector!(r#"a[href*="pageNumber"]"#);

    static ref TRIP_ROW: Selector = parse_selector!(r#"div[class*="ed-table__item_trip"]"#);

    static ref TRIP_START_STATION: Selector = parse_selector!(r#"div[class*="trip-start-station"]"#);

    static ref TRIP_END_STATION: Selector = parse_selector!(r#"div[class*="trip-end-station"]"#);

    static ref TRIP_START_DATE: Selector = parse_selector!(r#"div[class*="trip-start-date"]"#);

    static ref TRIP_END_DATE: Selector = parse_selector!(r#"div[class*="trip-end-date"]"#);

    static ref TRIP_DURATION: Selector = parse_selector!(r#"div[class*="trip-duration"]"#);
}

/// Selectors for the profile and trip history navigation
pub struct ProfileSelectors {
    pub member_id_link: &'static Selector,
    pub page_link: &'static Selector,
}

impl ProfileSelectors {
    pub fn new() -> Self {
        Self {
            member_id_link: &MEMBER_ID_LINK,
            page_link: &PAGE_LINK,
        }
    }
}

impl Default for ProfileSelectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Selectors for a single trip row and its cells
#[derive(Clone)]
pub struct TripSelectors {
    pub row: &'static Selector,
    pub start_station: &'static Selector,
    pub end_station: &'static Selector,
    pub start_date: &'static Selector,
    pub end_date: &'static Selector,
    pub duration: &'static Selector,
}

impl TripSelectors {
    pub fn new() -> Self {
        Self {
            row: &TRIP_ROW,
            start_station: &TRIP_START_STATION,
            end_station: &TRIP_END_STATION,
            start_date: &TRIP_START_DATE,
            end_date: &TRIP_END_DATE,
            duration: &TRIP_DURATION,
        }
    }
}

impl Default for TripSelectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Selector for the hidden anti-forgery input with the given name
pub fn token_input(field: &str) -> Option<Selector> {
    Selector::parse(&format!(r#"input[name="{field}"]"#)).ok()
}
