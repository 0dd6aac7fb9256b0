//! Fitness sink tests against wiremock provider APIs

use chrono::{FixedOffset, TimeZone};
use citifit::config::{FitbitConfig, GoogleFitConfig};
use citifit::error::Error;
use citifit::models::Trip;
use citifit::sinks::{FitbitSink, FitnessSink, GoogleFitSink};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_ID: &str = "raw:com.google.distance.delta:citifit";

/// 06/01/2015 08:00 AM Eastern, 12 min 5 s
fn morning_ride() -> Trip {
    let eastern = FixedOffset::west_opt(4 * 3600).unwrap();
    let start = eastern.with_ymd_and_hms(2015, 6, 1, 8, 0, 0).unwrap();
    let end = eastern.with_ymd_and_hms(2015, 6, 1, 8, 12, 5).unwrap();
    Trip::new(72, start, Some(79), Some(end), Some(725))
}

fn activity_catalog() -> serde_json::Value {
    json!({
        "categories": [{
            "name": "Sports and Workouts",
            "activities": [],
            "subCategories": [{
                "name": "Bicycling",
                "activities": [{ "id": 90001, "name": "Bike" }]
            }]
        }]
    })
}

async fn fitbit(server: &MockServer) -> FitbitSink {
    let config = FitbitConfig {
        api_base: server.uri(),
    };
    FitbitSink::new(&config, "fb-token").unwrap()
}

async fn google_fit(server: &MockServer) -> GoogleFitSink {
    let config = GoogleFitConfig {
        api_base: server.uri(),
        ..GoogleFitConfig::default()
    };
    GoogleFitSink::new(&config, "gf-token").unwrap()
}

#[tokio::test]
async fn test_fitbit_logs_activity() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/activities.json"))
        .and(header("Authorization", "Bearer fb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(activity_catalog()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/user/-/activities.json"))
        .and(header("Authorization", "Bearer fb-token"))
        .and(body_string_contains("activityId=90001"))
        .and(body_string_contains("startTime=08%3A00"))
        .and(body_string_contains("durationMillis=725000"))
        .and(body_string_contains("date=2015-06-01"))
        .and(body_string_contains("distance=2104"))
        .and(body_string_contains("distanceUnit=Meter"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "activityLog": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = fitbit(&server).await;
    sink.provision().await.unwrap();
    assert_eq!(sink.activity_id(), Some(90001));
    sink.add_trip(&morning_ride(), 2104).await.unwrap();
}

#[tokio::test]
async fn test_fitbit_provisioning_without_bike_activity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "categories": [] })))
        .mount(&server)
        .await;

    let mut sink = fitbit(&server).await;
    let err = sink.provision().await.unwrap_err();
    assert!(matches!(err, Error::SinkProvisioningFailed { ref provider, .. } if provider == "fitbit"));
}

#[tokio::test]
async fn test_fitbit_rejection_is_submission_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(activity_catalog()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/-/activities.json"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired_token"))
        .mount(&server)
        .await;

    let mut sink = fitbit(&server).await;
    sink.provision().await.unwrap();
    match sink.add_trip(&morning_ride(), 2104).await {
        Err(Error::SinkSubmissionFailed { provider, reason }) => {
            assert_eq!(provider, "fitbit");
            assert!(reason.contains("401"));
            assert!(reason.contains("expired_token"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_unprovisioned_sink_refuses_trips() {
    let server = MockServer::start().await;
    let sink = fitbit(&server).await;
    assert!(matches!(
        sink.add_trip(&morning_ride(), 100).await,
        Err(Error::SinkSubmissionFailed { .. })
    ));
}

#[tokio::test]
async fn test_google_fit_reuses_existing_data_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/me/dataSources"))
        .and(query_param("dataTypeName", "com.google.distance.delta"))
        .and(header("Authorization", "Bearer gf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dataSource": [
                { "dataStreamId": "raw:com.google.distance.delta:other", "dataStreamName": "other-app" },
                { "dataStreamId": STREAM_ID, "dataStreamName": "citifit-distance" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users/me/dataSources"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut sink = google_fit(&server).await;
    sink.provision().await.unwrap();
    assert_eq!(sink.data_source_id(), Some(STREAM_ID));
}

#[tokio::test]
async fn test_google_fit_creates_missing_data_source() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/me/dataSources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "dataSource": [] })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users/me/dataSources"))
        .and(body_partial_json(json!({
            "dataStreamName": "citifit-distance",
            "type": "raw",
            "dataType": { "name": "com.google.distance.delta" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dataStreamId": STREAM_ID,
            "dataStreamName": "citifit-distance"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = google_fit(&server).await;
    sink.provision().await.unwrap();
    assert_eq!(sink.data_source_id(), Some(STREAM_ID));
}

#[tokio::test]
async fn test_google_fit_writes_distance_and_session() {
    let server = MockServer::start().await;
    let trip = morning_ride();

    Mock::given(method("GET"))
        .and(path("/users/me/dataSources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dataSource": [{ "dataStreamId": STREAM_ID, "dataStreamName": "citifit-distance" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path_regex(r"^/users/me/dataSources/[^/]+/datasets/\d+-\d+$"))
        .and(body_partial_json(json!({
            "dataSourceId": STREAM_ID,
            "minStartTimeNs": "1433160000000000000",
            "maxEndTimeNs": "1433160725000000000",
            "point": [{ "value": [{ "fpVal": 2104.0 }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/users/me/sessions/citifit-1433160000"))
        .and(body_partial_json(json!({
            "id": "citifit-1433160000",
            "activityType": 1,
            "startTimeMillis": "1433160000000",
            "endTimeMillis": "1433160725000"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = google_fit(&server).await;
    sink.provision().await.unwrap();
    sink.add_trip(&trip, 2104).await.unwrap();
}

#[tokio::test]
async fn test_google_fit_provisioning_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/dataSources"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient scope"))
        .mount(&server)
        .await;

    let mut sink = google_fit(&server).await;
    let err = sink.provision().await.unwrap_err();
    assert!(matches!(err, Error::SinkProvisioningFailed { ref provider, .. } if provider == "google_fit"));
}
