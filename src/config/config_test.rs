use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_sync_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("SYNC__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = SyncConfig::default();

    assert_eq!(config.registry.sweep_interval_ms, 300_000);
    assert_eq!(config.registry.idle_threshold_ms, 600_000);
    assert_eq!(config.batcher.debounce_ms, 16);
    assert_eq!(config.delivery.poll_interval_ms, 1500);
    assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
    assert!(config.monitoring.metrics_enabled);
}

#[test]
#[serial]
fn default_config_should_pass_validation() {
    assert!(SyncConfig::default().validate().is_ok());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_sync_env_vars();
    with_vars(vec![("SYNC__BATCHER__DEBOUNCE_MS", Some("32"))], || {
        let config = SyncConfig::new().unwrap();

        assert_eq!(config.batcher.debounce_ms, 32);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_sync_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [registry]
        idle_threshold_ms = 5000

        [delivery]
        poll_interval_ms = 1000
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = SyncConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .expect("override should load");

        assert_eq!(config.registry.idle_threshold_ms, 5000);
        assert_eq!(config.delivery.poll_interval_ms, 1000);
        // untouched sections keep their defaults
        assert_eq!(config.batcher.debounce_ms, 16);
    });
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_sync_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    std::fs::write(
        &config_path,
        r#"
        [server]
        listen_addr = "127.0.0.1:9000"
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", Some(config_path.to_str().unwrap())),
            ("SYNC__SERVER__LISTEN_ADDR", Some("127.0.0.1:9100")),
        ],
        || {
            let config = SyncConfig::new().unwrap();
            assert_eq!(config.server.listen_addr, "127.0.0.1:9100");
        },
    );
}

#[test]
fn validation_should_reject_zero_sweep_interval() {
    let mut config = SyncConfig::default();
    config.registry.sweep_interval_ms = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_short_idle_threshold() {
    let mut config = SyncConfig::default();
    config.registry.idle_threshold_ms = 999;
    assert!(config.clone().validate().is_err());

    config.registry.idle_threshold_ms = 1000;
    assert!(config.validate().is_ok());
}

#[test]
fn validation_should_bound_debounce_window() {
    let mut config = BatcherConfig::default();

    config.debounce_ms = 0;
    assert!(config.validate().is_err());

    config.debounce_ms = 1001;
    assert!(config.validate().is_err());

    config.debounce_ms = 1;
    assert!(config.validate().is_ok());
}

#[test]
fn validation_should_bound_delivery_intervals() {
    let mut config = DeliveryConfig::default();
    config.poll_interval_ms = 100;
    assert!(config.validate().is_err());

    let mut config = DeliveryConfig::default();
    config.reconnect_backoff_ms = 60_001;
    assert!(config.validate().is_err());

    let mut config = DeliveryConfig::default();
    config.history_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_unparseable_listen_addr() {
    let mut config = SyncConfig::default();
    config.server.listen_addr = "not-an-address".to_string();
    assert!(config.clone().validate().is_err());

    // Disabled server does not need a valid address
    config.server.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn debug_output_should_list_every_section() {
    let rendered = format!("{:?}", SyncConfig::default());
    for section in ["registry", "batcher", "delivery", "server", "monitoring"] {
        assert!(rendered.contains(section), "missing {section} in {rendered}");
    }
    assert!(rendered.contains("poll_interval_ms: 1500"));
    assert!(rendered.contains("log_dir"));
}
