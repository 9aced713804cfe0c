use std::time::Duration;

use serde::Deserialize;

/// Server configuration.
///
/// Loaded from a YAML file pointed at by the `HEARTH_CONFIG` environment
/// variable, falling back to built-in defaults. The `LISTEN` environment
/// variable overrides the listen address either way.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: String,
    /// Keep-alive decision when the request carries no `Connection` header.
    pub keep_alive_default: bool,
    /// Idle connections older than this are closed by the reactor sweep.
    pub idle_timeout_ms: u64,
    /// How often the reactor sweeps idle connections.
    pub idle_sweep_interval_ms: u64,
    /// Worker pool size used by the binary.
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie or parameter name carrying the session id.
    pub name: String,
    /// Carry the session id in a cookie; otherwise in a request parameter.
    pub use_cookies: bool,
    /// Sessions inactive for longer than this are removed by the sweep.
    pub max_inactive_interval_ms: u64,
    /// How often the background sweeper runs.
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            keep_alive_default: true,
            idle_timeout_ms: 5_000,
            idle_sweep_interval_ms: 10_000,
            workers: 4,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "sessionId".to_string(),
            use_cookies: true,
            max_inactive_interval_ms: 300_000,
            sweep_interval_ms: 60_000,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let mut cfg = match std::env::var("HEARTH_CONFIG") {
            Ok(path) => Self::load_file(&path).unwrap_or_default(),
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = addr;
        }
        cfg
    }

    fn load_file(path: &str) -> Option<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| tracing::warn!("Cannot read config file {}: {}", path, err))
            .ok()?;
        serde_yaml::from_str(&contents)
            .map_err(|err| tracing::warn!("Cannot parse config file {}: {}", path, err))
            .ok()
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.idle_sweep_interval_ms)
    }
}

impl SessionConfig {
    pub fn max_inactive_interval(&self) -> Duration {
        Duration::from_millis(self.max_inactive_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
