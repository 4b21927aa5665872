//! Configuration loading tests. File layers only; the environment is left
//! alone because tests share one process.

use placement_data::config::{FanOutStrategy, PlacementConfig};
use placement_data::error::DataError;
use std::io::Write;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn config_has_expected_defaults() {
    let config = PlacementConfig::default();
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.query.default_page_size, 25);
    assert_eq!(config.query.max_page_size, 200);
    assert_eq!(config.enrichment.strategy, FanOutStrategy::Batched);
    assert_eq!(config.enrichment.row_concurrency, 1);
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let file = config_file("[query]\ndefault_page_size = 10\n");
    let config = PlacementConfig::load_from(Some(file.path())).expect("config loads");
    assert_eq!(config.query.default_page_size, 10);
    assert_eq!(config.query.max_page_size, 200);
    assert_eq!(config.enrichment, PlacementConfig::default().enrichment);
}

#[test]
fn invalid_values_are_configuration_errors() {
    let file = config_file("[query]\ndefault_page_size = 500\nmax_page_size = 50\n");
    let result = PlacementConfig::load_from(Some(file.path()));
    assert!(matches!(result, Err(DataError::Configuration(_))));

    let file = config_file("[enrichment]\nstrategy = \"sometimes\"\n");
    let result = PlacementConfig::load_from(Some(file.path()));
    assert!(matches!(result, Err(DataError::Configuration(_))));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = PlacementConfig::load_from(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(DataError::Configuration(_))));
}

#[test]
fn strategy_names_are_snake_case() {
    assert_eq!(
        serde_json::to_string(&FanOutStrategy::PerRow).unwrap(),
        "\"per_row\""
    );
    let parsed: FanOutStrategy = serde_json::from_str("\"batched\"").unwrap();
    assert_eq!(parsed, FanOutStrategy::Batched);
}
