//! Config file loading tests

use std::io::Write;
use std::path::Path;

use citifit::config::{Config, TokenStrategy};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_example_config_loads_and_validates() {
    let config = assert_ok!(Config::from_file(Path::new("config.example.toml")));
    assert_ok!(config.validate());

    assert_eq!(config.source.timezone, "America/New_York");
    assert_eq!(config.source.max_attempts, 5);
    assert_eq!(config.sync.submission_delay_ms, 1000);
    assert_eq!(config.google_fit.data_stream_name, "citifit-distance");
    assert_eq!(config.source.token_strategy, TokenStrategy::default());
}

#[test]
fn test_from_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[source]
base_url = "http://127.0.0.1:9000"
max_attempts = 2

[source.token_strategy]
kind = "cookie"
name = "XSRF-TOKEN"

[database]
sqlite_path = "/var/lib/citifit/accounts.db"
"#
    )
    .unwrap();

    let config = assert_ok!(Config::from_file(file.path()));
    assert_eq!(config.source.base_url, "http://127.0.0.1:9000");
    assert_eq!(config.source.max_attempts, 2);
    assert_eq!(config.source.retry().max_attempts, 2);
    assert_eq!(
        config.source.token_strategy,
        TokenStrategy::Cookie {
            name: "XSRF-TOKEN".to_string()
        }
    );
    assert_eq!(
        config.database.sqlite_path,
        Path::new("/var/lib/citifit/accounts.db")
    );
    // Untouched sections keep their defaults
    assert_eq!(config.fitbit.api_base, "https://api.fitbit.com/1");
    assert_ok!(config.validate());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = assert_err!(Config::from_file(&dir.path().join("absent.toml")));
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[source\nbase_url = ").unwrap();
    let err = assert_err!(Config::from_file(file.path()));
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_invalid_values_fail_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[source]\nbase_url = \"not a url\"").unwrap();
    let config = assert_ok!(Config::from_file(file.path()));
    assert_err!(config.validate());
}
