use std::env;
use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use super::{FleetBackend, SessionSettings, Settings, StoreBackend, load_config};
use crate::utils::RelayError;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.session.outbound_capacity, 256);
    assert_eq!(settings.session.auth_grace_secs, 30);
    assert_eq!(settings.session.sweep_interval_secs, 120);
    assert_eq!(settings.store.backend, StoreBackend::Redis);
    assert_eq!(settings.fleet.backend, FleetBackend::Redis);
}

#[test]
fn key_prefixes_are_disjoint() {
    let settings = Settings::default();
    let (chat, app) = settings.key_prefixes();
    assert_eq!(chat, "relaychat:latest:");
    assert_eq!(app, "relaychat:latest:app:");
}

#[test]
fn ping_period_is_shorter_than_pong_wait() {
    let settings = Settings::default();
    assert_eq!(settings.session.pong_wait(), Duration::from_secs(50));
    assert_eq!(settings.session.ping_period(), Duration::from_secs(45));
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [store]
        backend = "sled"
        sled_path = "data"

        [session]
        outbound_capacity = 8
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.store.backend, StoreBackend::Sled);
    assert_eq!(cfg.store.sled_path, "data");
    assert_eq!(cfg.session.outbound_capacity, 8);
    // untouched values keep their defaults
    assert_eq!(cfg.session.auth_grace_secs, 30);
    assert_eq!(cfg.service.topic, "relaychat.messages");
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    temp_env::with_vars(
        [
            ("RELAYCHAT_SERVER__PORT", Some("9100")),
            ("RELAYCHAT_SERVICE__TOPIC", Some("fleet.test")),
            ("RELAYCHAT_FLEET__BACKEND", Some("local")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.service.topic, "fleet.test");
            assert_eq!(cfg.fleet.backend, FleetBackend::Local);
        },
    );
}

#[test]
fn default_session_settings_are_valid() {
    assert!(SessionSettings::default().validate().is_ok());
}

#[test]
fn zero_session_values_are_rejected() {
    for broken in [
        SessionSettings {
            outbound_capacity: 0,
            ..SessionSettings::default()
        },
        SessionSettings {
            write_wait_secs: 0,
            ..SessionSettings::default()
        },
        SessionSettings {
            pong_wait_secs: 0,
            ..SessionSettings::default()
        },
        SessionSettings {
            max_message_bytes: 0,
            ..SessionSettings::default()
        },
        SessionSettings {
            sweep_interval_secs: 0,
            ..SessionSettings::default()
        },
    ] {
        assert!(matches!(broken.validate(), Err(RelayError::Config(_))));
    }
}

#[test]
#[serial]
fn load_config_rejects_zero_buffer_and_sweep_interval() {
    temp_env::with_vars(
        [
            ("RELAYCHAT_SESSION__OUTBOUND_CAPACITY", Some("0")),
            ("RELAYCHAT_SESSION__SWEEP_INTERVAL_SECS", Some("0")),
        ],
        || {
            let err = load_config().unwrap_err();
            assert!(matches!(err, RelayError::Config(_)));
            assert!(err.to_string().contains("outbound_capacity"));
        },
    );
}
