use std::time::Duration;

use hearth::config::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert!(cfg.server.keep_alive_default);
    assert_eq!(cfg.server.idle_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.server.idle_sweep_interval(), Duration::from_secs(10));
    assert_eq!(cfg.server.workers, 4);
    assert_eq!(cfg.session.name, "sessionId");
    assert!(cfg.session.use_cookies);
    assert_eq!(cfg.session.max_inactive_interval(), Duration::from_secs(300));
    assert_eq!(cfg.session.sweep_interval(), Duration::from_secs(60));
}

// Environment mutation lives in one test so parallel runs cannot race.
#[test]
fn test_config_env_and_file() {
    unsafe {
        std::env::remove_var("HEARTH_CONFIG");
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");

    // LISTEN overrides the listen address.
    unsafe {
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");

    // A config file sets whatever it names; LISTEN still wins for the
    // address, and unnamed fields keep their defaults.
    let path = std::env::temp_dir().join("hearth-test-config.yaml");
    std::fs::write(
        &path,
        "server:\n  listen_addr: 10.0.0.1:9999\n  workers: 2\nsession:\n  name: sid\n",
    )
    .unwrap();
    unsafe {
        std::env::set_var("HEARTH_CONFIG", &path);
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.server.workers, 2);
    assert_eq!(cfg.session.name, "sid");
    assert!(cfg.server.keep_alive_default);

    unsafe {
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "10.0.0.1:9999");

    // An unreadable file falls back to defaults.
    unsafe {
        std::env::set_var("HEARTH_CONFIG", "/nonexistent/hearth.yaml");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");

    unsafe {
        std::env::remove_var("HEARTH_CONFIG");
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.server.listen_addr, cfg2.server.listen_addr);
    assert_eq!(cfg1.session.name, cfg2.session.name);
}
