//! Integration tests for environment-based configuration

use docflow_core::{BackpressureConfigBuilder, ConfigError};
use serial_test::serial;
use std::env;
use std::time::Duration;

const ALL_VARS: &[&str] = &[
    "DOCFLOW_MAX_QUEUE_DEPTH",
    "DOCFLOW_MAX_CONCURRENT_TASKS",
    "DOCFLOW_CPU_THRESHOLD_PERCENT",
    "DOCFLOW_ENABLE_DYNAMIC_SCALING",
    "DOCFLOW_MIN_WORKERS",
    "DOCFLOW_MAX_WORKERS",
    "DOCFLOW_SCALE_COOLDOWN_SECS",
    "DOCFLOW_ENQUEUE_TIMEOUT_MS",
];

/// Helper to set environment variable for test
fn set_env(key: &str, value: &str) {
    unsafe {
        env::set_var(key, value);
    }
}

/// Helper to clear environment variable after test
fn clear_env(key: &str) {
    unsafe {
        env::remove_var(key);
    }
}

fn clear_all_docflow_env_vars() {
    for key in ALL_VARS {
        clear_env(key);
    }
}

#[test]
#[serial]
fn test_env_config_default_when_no_vars_set() {
    clear_all_docflow_env_vars();

    let config = BackpressureConfigBuilder::from_env()
        .expect("should load defaults when no env vars set")
        .build()
        .expect("should build valid config");

    assert_eq!(config.max_queue_depth(), 100);
    assert_eq!(config.max_concurrent_tasks(), 10);
    assert_eq!(config.cpu_threshold_percent(), 80.0);
    assert!(config.enable_dynamic_scaling());
    assert_eq!(config.min_workers(), 1);
    assert_eq!(config.scale_cooldown(), Duration::from_secs(10));
    assert_eq!(config.enqueue_timeout(), None);
}

#[test]
#[serial]
fn test_env_config_all_values() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_MAX_QUEUE_DEPTH", "250");
    set_env("DOCFLOW_MAX_CONCURRENT_TASKS", "4");
    set_env("DOCFLOW_CPU_THRESHOLD_PERCENT", "65.5");
    set_env("DOCFLOW_ENABLE_DYNAMIC_SCALING", "off");
    set_env("DOCFLOW_MIN_WORKERS", "2");
    set_env("DOCFLOW_MAX_WORKERS", "6");
    set_env("DOCFLOW_SCALE_COOLDOWN_SECS", "3");
    set_env("DOCFLOW_ENQUEUE_TIMEOUT_MS", "1500");

    let config = BackpressureConfigBuilder::from_env()
        .expect("should load config")
        .build()
        .expect("should build valid config");

    assert_eq!(config.max_queue_depth(), 250);
    assert_eq!(config.max_concurrent_tasks(), 4);
    assert_eq!(config.cpu_threshold_percent(), 65.5);
    assert!(!config.enable_dynamic_scaling());
    assert_eq!(config.min_workers(), 2);
    assert_eq!(config.max_workers(), 6);
    assert_eq!(config.scale_cooldown(), Duration::from_secs(3));
    assert_eq!(config.enqueue_timeout(), Some(Duration::from_millis(1500)));

    clear_all_docflow_env_vars();
}

#[test]
#[serial]
fn test_env_config_invalid_number() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_MAX_QUEUE_DEPTH", "lots");

    let result = BackpressureConfigBuilder::from_env();
    match result {
        Err(ConfigError::InvalidEnvVar { key, .. }) => {
            assert_eq!(key, "DOCFLOW_MAX_QUEUE_DEPTH");
        }
        other => panic!("expected InvalidEnvVar, got {other:?}"),
    }

    clear_env("DOCFLOW_MAX_QUEUE_DEPTH");
}

#[test]
#[serial]
fn test_env_config_invalid_boolean() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_ENABLE_DYNAMIC_SCALING", "maybe");

    let err = BackpressureConfigBuilder::from_env().unwrap_err();
    assert!(err.to_string().contains("DOCFLOW_ENABLE_DYNAMIC_SCALING"));

    clear_env("DOCFLOW_ENABLE_DYNAMIC_SCALING");
}

#[test]
#[serial]
fn test_env_config_out_of_range_fails_at_build() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_CPU_THRESHOLD_PERCENT", "150");

    let builder = BackpressureConfigBuilder::from_env().expect("parses as a number");
    assert!(matches!(
        builder.build(),
        Err(ConfigError::ValidationError(_))
    ));

    clear_env("DOCFLOW_CPU_THRESHOLD_PERCENT");
}

#[test]
#[serial]
fn test_env_config_min_above_max_workers() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_MIN_WORKERS", "8");
    set_env("DOCFLOW_MAX_WORKERS", "2");

    let err = BackpressureConfigBuilder::from_env()
        .expect("should load config")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("min_workers (8) must be <= max_workers (2)"));

    clear_all_docflow_env_vars();
}

#[test]
#[serial]
fn test_env_config_overridable_after_load() {
    clear_all_docflow_env_vars();
    set_env("DOCFLOW_ENQUEUE_TIMEOUT_MS", "200");

    let config = BackpressureConfigBuilder::from_env()
        .expect("should load config")
        .enqueue_timeout(None)
        .build()
        .expect("should build valid config");
    assert_eq!(config.enqueue_timeout(), None);

    clear_env("DOCFLOW_ENQUEUE_TIMEOUT_MS");
}
