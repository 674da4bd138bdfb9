//! Configuration file loading tests
//!
//! Each test names its own environment variable so tests can run in
//! parallel without touching shared process state.

use std::io::Write;

use vocoach_ap::{AppConfig, Error, UnderrunStrategy};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[engine]
pre_buffer_threshold_ms = 450
underrun_strategy = "repeat"

[engine.conservative_fill]
target_ms = 800
max_chunks_per_tick = 2

[output]
null_device = true
"#,
    );

    let config = AppConfig::load(Some(file.path()), "VOCOACH_TEST_UNSET_PARTIAL").unwrap();
    assert_eq!(config.engine.pre_buffer_threshold_ms, 450.0);
    assert_eq!(config.engine.underrun_strategy, UnderrunStrategy::Repeat);
    assert_eq!(config.engine.conservative_fill.target_ms, 800.0);
    assert_eq!(config.engine.conservative_fill.max_chunks_per_tick, 2);
    assert!(config.output.null_device);

    // Untouched fields fall back to built-in defaults
    assert_eq!(config.engine.sample_rate, 16_000);
    assert_eq!(config.engine.aggressive_fill.max_chunks_per_tick, 16);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_env_var_path_is_used() {
    let file = write_config("[engine]\nsample_rate = 24000\n");
    let var = "VOCOACH_TEST_CONFIG_ENV_PATH";
    std::env::set_var(var, file.path());

    let config = AppConfig::load(None, var).unwrap();
    assert_eq!(config.engine.sample_rate, 24_000);

    std::env::remove_var(var);
}

#[test]
fn test_cli_path_must_exist() {
    let result = AppConfig::load(
        Some(std::path::Path::new("/no/such/vocoach.toml")),
        "VOCOACH_TEST_UNSET_MISSING",
    );
    assert!(matches!(result, Err(Error::Common(_))));
}

#[test]
fn test_invalid_values_rejected() {
    let file = write_config("[engine]\nsample_rate = 4000\n");
    let result = AppConfig::load(Some(file.path()), "VOCOACH_TEST_UNSET_INVALID");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_fill_target_above_cap_rejected() {
    let file = write_config(
        "[engine]\nmax_buffered_ms = 1000\n\n[engine.aggressive_fill]\ntarget_ms = 1500\nmax_chunks_per_tick = 16\n",
    );
    let result = AppConfig::load(Some(file.path()), "VOCOACH_TEST_UNSET_FILL");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_toml_rejected() {
    let file = write_config("[engine\nsample_rate = ");
    assert!(AppConfig::load(Some(file.path()), "VOCOACH_TEST_UNSET_MALFORMED").is_err());
}
