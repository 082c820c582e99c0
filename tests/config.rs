use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use kira_metadata_fetcher::config::{ConfigLoader, EnaOverrides, FetchOverrides};
use kira_metadata_fetcher::domain::Source;
use kira_metadata_fetcher::error::KiraError;

#[test]
fn load_without_path_is_default() {
    let config = ConfigLoader::load(None).unwrap();
    assert_eq!(config.delay_secs, None);
    assert_eq!(config.ena.fields, None);
}

#[test]
fn load_and_resolve_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-mf.json");
    fs::write(
        &path,
        r#"{
            "delay_secs": 0,
            "max_hits": 5000,
            "retries": 2,
            "retry_delay_secs": 0.5,
            "ena": {"base_url": "http://localhost:8080/api", "limit": 10}
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load(Some(&path)).unwrap();
    let settings =
        ConfigLoader::resolve_run(Source::Sra, &config, &FetchOverrides::default(), |_| None)
            .unwrap();
    assert_eq!(settings.delay, Duration::ZERO);
    assert_eq!(settings.max_hits, Some(5000));
    assert_eq!(settings.retry.retries, 2);
    assert_eq!(settings.retry.backoff, Duration::from_millis(500));

    let ena = ConfigLoader::resolve_ena(
        &config.ena,
        &EnaOverrides {
            limit: Some(0),
            ..EnaOverrides::default()
        },
    );
    assert_eq!(ena.base_url, "http://localhost:8080/api");
    assert_eq!(ena.limit, 0);
}

#[test]
fn ena_defaults_without_file_or_env() {
    let settings = ConfigLoader::resolve_run(
        Source::Ena,
        &ConfigLoader::load(None).unwrap(),
        &FetchOverrides::default(),
        |_| None,
    )
    .unwrap();
    assert_eq!(settings.delay, Duration::from_millis(800));
    assert_eq!(settings.retry.retries, 8);
}

#[test]
fn missing_config_file_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let err = ConfigLoader::load(Some(&temp.path().join("absent.json"))).unwrap_err();
    assert_matches!(err, KiraError::ConfigRead(_));
}

#[test]
fn malformed_config_file_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-mf.json");
    fs::write(&path, r#"{"retries": "many"}"#).unwrap();
    let err = ConfigLoader::load(Some(&path)).unwrap_err();
    assert_matches!(err, KiraError::ConfigParse(_));
}
