//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use lp_experiments::config::{Config, LogFormat};
use serial_test::serial;
use std::env;

fn clear_env() {
    for key in [
        "BIND_ADDR",
        "DATABASE_PATH",
        "DATABASE_MAX_CONNECTIONS",
        "LOG_LEVEL",
        "LOG_FORMAT",
        "BEACON_QUEUE_CAPACITY",
        "SESSION_COOKIE_MAX_AGE_DAYS",
        "ANALYSIS_MIN_CONVERSIONS",
        "ANALYSIS_MIN_IMPROVEMENT_PCT",
        "GENERATION_API_KEY",
        "GENERATION_BASE_URL",
        "GENERATION_MODEL",
        "REQUEST_TIMEOUT_MS",
        "MAX_RETRIES",
        "RETRY_DELAY_MS",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:8080");
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.tracking.beacon_queue_capacity, 1024);
    assert_eq!(config.tracking.session_cookie_max_age_days, 30);
    assert_eq!(config.analysis.min_conversions, 10);
    assert_eq!(config.analysis.min_improvement_pct, 10.0);
    assert!(config.generation.api_key.is_none());
    assert_eq!(config.request.max_retries, 3);
}

#[test]
#[serial]
fn test_config_custom_server_and_database() {
    clear_env();
    env::set_var("BIND_ADDR", "0.0.0.0:9100");
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:9100");
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(config.database.max_connections, 10);

    clear_env();
}

#[test]
#[serial]
fn test_config_invalid_bind_addr_is_an_error() {
    clear_env();
    env::set_var("BIND_ADDR", "not-an-address");

    assert!(Config::from_env().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_config_json_log_format() {
    clear_env();
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    clear_env();
}

#[test]
#[serial]
fn test_config_analysis_thresholds() {
    clear_env();
    env::set_var("ANALYSIS_MIN_CONVERSIONS", "25");
    env::set_var("ANALYSIS_MIN_IMPROVEMENT_PCT", "5.5");

    let config = Config::from_env().unwrap();
    assert_eq!(config.analysis.min_conversions, 25);
    assert_eq!(config.analysis.min_improvement_pct, 5.5);

    clear_env();
}

#[test]
#[serial]
fn test_config_empty_generation_key_reads_as_unconfigured() {
    clear_env();
    env::set_var("GENERATION_API_KEY", "");

    let config = Config::from_env().unwrap();
    assert!(config.generation.api_key.is_none());

    env::set_var("GENERATION_API_KEY", "sk-test");
    let config = Config::from_env().unwrap();
    assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));

    clear_env();
}

#[test]
#[serial]
fn test_config_unparseable_numbers_fall_back_to_defaults() {
    clear_env();
    env::set_var("DATABASE_MAX_CONNECTIONS", "lots");
    env::set_var("ANALYSIS_MIN_CONVERSIONS", "-3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.analysis.min_conversions, 10);

    clear_env();
}
