//! Configuration loading and validation tests.
//!
//! Tests the shipped example file, partial configs, environment overrides
//! and CLI overrides.

use lanwatch_core::config::LanwatchConfig;
use lanwatch_core::settings::CycleSettings;

const EXAMPLE: &str = include_str!("../../lanwatch.toml.example");

#[test]
fn test_example_config_parses_and_validates() {
    // Given: The example config shipped with the repository
    // When: Parsing it
    let config = LanwatchConfig::parse(EXAMPLE).expect("example config should parse");

    // Then: It validates and carries the documented defaults
    config.validate().expect("example config should validate");
    assert_eq!(config.syslog.bind, "0.0.0.0:514");
    assert_eq!(config.retention.snapshot_retention_days, 7);
    assert_eq!(config.retention.syslog_retention_days, 30);
    assert_eq!(config.inventory.inactivity_threshold_mins, 10);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_partial_config_uses_defaults() {
    let config = LanwatchConfig::parse(
        r#"
[syslog]
bind = "127.0.0.1:5514"
"#,
    )
    .expect("partial config should parse");

    assert_eq!(config.syslog.bind, "127.0.0.1:5514");
    assert_eq!(config.general.log_level, "info");
    assert!(config.inventory.enabled);
    config.validate().expect("defaults should validate");
}

#[test]
fn test_cycle_settings_follow_config() {
    let config = LanwatchConfig::parse(
        r#"
[inventory]
inactivity_threshold_mins = 15
correlation_enabled = false

[retention]
snapshot_retention_days = 3
"#,
    )
    .unwrap();

    let settings = CycleSettings::from_config(&config);
    assert_eq!(settings.inactivity_threshold_mins, 15);
    assert!(!settings.correlation_enabled);
    assert_eq!(settings.snapshot_retention_days, 3);
    assert_eq!(settings.syslog_retention_days, 30);
}

#[test]
fn test_invalid_bind_is_rejected() {
    let config = LanwatchConfig::parse(
        r#"
[syslog]
bind = "not-an-address"
"#,
    )
    .unwrap();

    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("syslog.bind"), "got: {err}");
}

#[test]
fn test_disabled_syslog_skips_bind_validation() {
    let config = LanwatchConfig::parse(
        r#"
[syslog]
enabled = false
bind = "not-an-address"
"#,
    )
    .unwrap();

    assert!(config.validate().is_ok());
}

#[tokio::test]
#[serial_test::serial]
async fn test_env_override_applies_on_load() {
    // Given: A config file and an environment override
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lanwatch.toml");
    std::fs::write(&path, "[syslog]\nbind = \"127.0.0.1:514\"\n").unwrap();
    // SAFETY: serial test, no other test touches this variable concurrently
    unsafe { std::env::set_var("LANWATCH_SYSLOG_BIND", "127.0.0.1:5514") };

    // When: Loading
    let config = LanwatchConfig::load(&path).await;
    // SAFETY: see above
    unsafe { std::env::remove_var("LANWATCH_SYSLOG_BIND") };

    // Then: The environment wins over the file
    assert_eq!(config.unwrap().syslog.bind, "127.0.0.1:5514");
}

#[test]
fn test_cli_overrides_win_over_file() {
    use clap::Parser;
    use lanwatch_daemon::cli::DaemonCli;

    let mut config = LanwatchConfig::parse(EXAMPLE).unwrap();
    let cli = DaemonCli::parse_from(["lanwatch-daemon", "--log-format", "pretty"]);
    cli.apply_overrides(&mut config);

    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn test_example_config_round_trips_through_toml() {
    let config = LanwatchConfig::parse(EXAMPLE).unwrap();
    let rendered = toml::to_string(&config).expect("config serializes");
    let reparsed = LanwatchConfig::parse(&rendered).expect("rendered config parses");
    assert_eq!(reparsed.store.path, config.store.path);
    assert_eq!(reparsed.inventory.feed_capacity, config.inventory.feed_capacity);
}
