use super::settings::Settings;
use super::{BusBackend, load_config};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.server.max_connections, 1000);
    assert_eq!(settings.server.handshake_timeout_secs, 30);
    assert_eq!(settings.server.outbound_buffer, 256);
    assert_eq!(settings.store.path, "pawchat_db");
    assert_eq!(settings.bus.backend, BusBackend::Local);
    assert_eq!(settings.bus.channel, "chat");
    assert_eq!(settings.history.limit, 50);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("PAWCHAT_SERVER__PORT", Some("9100")),
            ("PAWCHAT_SERVER__JWT_SECRET", Some("env_secret")),
            ("PAWCHAT_BUS__BACKEND", Some("redis")),
            ("PAWCHAT_HISTORY__LIMIT", Some("10")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.server.jwt_secret, "env_secret");
            assert_eq!(cfg.bus.backend, BusBackend::Redis);
            assert_eq!(cfg.history.limit, 10);
            // untouched keys keep their defaults
            assert_eq!(cfg.server.host, "127.0.0.1");
            assert_eq!(cfg.bus.channel, "chat");
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000
        jwt_secret = "file_secret"
        outbound_buffer = 8

        [store]
        path = "/var/lib/pawchat"

        [bus]
        channel = "dm"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.jwt_secret, "file_secret");
    assert_eq!(cfg.server.outbound_buffer, 8);
    assert_eq!(cfg.server.max_connections, 1000);
    assert_eq!(cfg.store.path, "/var/lib/pawchat");
    assert_eq!(cfg.bus.channel, "dm");
    assert_eq!(cfg.bus.backend, BusBackend::Local);
}
