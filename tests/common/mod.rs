//! Common test utilities
#![allow(dead_code)]

use chrono::DateTime;
use citifit::config::SourceConfig;
use citifit::models::{Station, StationId, Trip, TripId};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MEMBER_ID: &str = "m42";
pub const TOKEN: &str = "tok-7f3a";

/// Source configuration pointing every endpoint at a mock server
pub fn source_config(server: &MockServer) -> SourceConfig {
    SourceConfig {
        base_url: server.uri(),
        stations_url: format!("{}/stations/json", server.uri()),
        max_attempts: 3,
        backoff_base_ms: 1,
        request_timeout_secs: 5,
        rate_limit: 1000,
        ..SourceConfig::default()
    }
}

pub fn station(id: StationId, name: &str, lat: f64, lng: f64) -> Station {
    Station {
        id,
        name: name.to_string(),
        lat,
        lng,
        total_docks: 30,
        available_bikes: 12,
        available_docks: 18,
    }
}

/// Trip whose id is `id` (start time at that epoch second)
pub fn trip(id: TripId, start: StationId, end: Option<StationId>, duration: u32) -> Trip {
    let start_time = DateTime::from_timestamp(id, 0).unwrap().fixed_offset();
    Trip::new(start, start_time, end, None, Some(duration))
}

pub fn stations_json() -> String {
    r#"{"executionTime":"2015-06-01 08:00:00 AM","stationBeanList":[
        {"id":72,"stationName":"W 52 St & 11 Ave","latitude":40.76727216,"longitude":-73.99392888,"totalDocks":39,"availableBikes":5,"availableDocks":34},
        {"id":79,"stationName":"Franklin St & W Broadway","latitude":40.71911552,"longitude":-74.00666661,"totalDocks":33,"availableBikes":20,"availableDocks":13},
        {"id":82,"stationName":"St James Pl & Pearl St","latitude":"40.71117416","longitude":"-74.00016545","totalDocks":27,"availableBikes":3,"availableDocks":24}
    ]}"#
    .to_string()
}

pub fn login_page(token: Option<&str>) -> String {
    let input = token
        .map(|t| format!(r#"<input type="hidden" name="_login_csrf_security_token" value="{t}">"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><form action="/profile/login_check" method="post">
            <input name="_username"><input name="_password" type="password">{input}
        </form></body></html>"#
    )
}

pub fn profile_page() -> String {
    format!(
        r#"<html><body><nav>
            <a href="/profile/">Profile</a>
            <a href="/profile/trips/{MEMBER_ID}?memberId={MEMBER_ID}">Trips</a>
        </nav></body></html>"#
    )
}

/// One trip history row
pub fn trip_row(start: &str, end: &str, start_date: &str, end_date: &str, duration: &str) -> String {
    format!(
        r#"<div class="ed-table__item ed-table__item_trip">
            <div class="ed-table__col trip-start-date">{start_date}</div>
            <div class="ed-table__col trip-start-station">{start}</div>
            <div class="ed-table__col trip-end-date">{end_date}</div>
            <div class="ed-table__col trip-end-station">{end}</div>
            <div class="ed-table__col trip-duration">{duration}</div>
        </div>"#
    )
}

/// Trip history page with rows and, optionally, an "Oldest" link
pub fn trips_page(rows: &[String], last_page: Option<u32>) -> String {
    let pagination = last_page
        .map(|n| {
            format!(
                r#"<a href="/profile/trips/{MEMBER_ID}?pageNumber=1">Older</a>
                   <a href="/profile/trips/{MEMBER_ID}?pageNumber={n}">Oldest</a>"#
            )
        })
        .unwrap_or_default();
    format!(
        "<html><body><div class=\"ed-table\">{}</div>{pagination}</body></html>",
        rows.join("\n")
    )
}

/// Station feed plus a login flow that accepts the credentials
pub async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/stations/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(stations_json()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/profile/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page(Some(TOKEN))))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/profile/login_check"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/profile/"))
        .mount(server)
        .await;
}

pub async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/profile/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_page()))
        .mount(server)
        .await;
}

/// Serve `pages[n]` for `?pageNumber=n` and page 0 for the bare history URL
pub async fn mount_trip_pages(server: &MockServer, pages: &[String]) {
    let history = format!("/profile/trips/{MEMBER_ID}");
    for (n, body) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(history.as_str()))
            .and(query_param("pageNumber", n.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(server)
            .await;
    }

    if let Some(first) = pages.first() {
        Mock::given(method("GET"))
            .and(path(history.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(first.clone()))
            .with_priority(10)
            .mount(server)
            .await;
    }
}
