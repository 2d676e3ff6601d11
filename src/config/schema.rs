use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// ADB-related settings (binary path, push/shell behavior).
    pub adb: AdbConfig,
    /// Web listener settings (HTTP static files, WebSocket gateway).
    pub web: WebConfig,
    /// Session lifecycle timeouts and resource limits.
    pub session: SessionConfig,
    /// Output locations for diagnostics snapshots and HAR captures.
    pub diagnostics: DiagnosticsConfig,
    /// The `NODE_ENV`-style deployment environment name.
    pub node_env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb: AdbConfig::default(),
            web: WebConfig::default(),
            session: SessionConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            node_env: "production".to_string(),
        }
    }
}

/// ADB transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbConfig {
    /// Explicit path to the `adb` binary. Empty means "resolve at
    /// startup" (env var, bundled path, then `PATH` lookup).
    pub adb_path: String,
    /// Base URL of the companion diagnostics/HAR collection server.
    pub simba_server_url: String,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: String::new(),
            simba_server_url: String::new(),
        }
    }
}

/// Web listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address shared by both listeners.
    pub bind_address: String,
    /// HTTP static-file listener port.
    pub http_port: u16,
    /// WebSocket gateway listener port.
    pub websocket_port: u16,
    /// Directory served by the static file listener.
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8000,
            websocket_port: 8080,
            static_dir: "public".to_string(),
        }
    }
}

/// Session lifecycle timeouts, ports, and resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Base local port for accepting device server connections;
    /// `localPort = server_port_base + (liveSessions % 1000)`.
    pub server_port_base: u16,
    /// Timeout for handshake completion on each accepted socket.
    pub handshake_timeout_secs: u64,
    /// Timeout for joining pump/writer tasks during teardown before
    /// they are abandoned.
    pub pump_join_timeout_secs: u64,
    /// Default timeout for an ADB-backed command's request/response.
    pub command_timeout_secs: u64,
    /// Client sink buffer threshold above which non-key video frames
    /// and non-config audio frames are dropped.
    pub max_client_buffer_bytes: usize,
    /// Capacity of the bounded inbound control-frame queue.
    pub control_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_port_base: 27183,
            handshake_timeout_secs: 10,
            pump_join_timeout_secs: 5,
            command_timeout_secs: 15,
            max_client_buffer_bytes: 8 * 1024 * 1024,
            control_queue_capacity: 1024,
        }
    }
}

/// Diagnostics and HAR capture output locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub diagnostics_dir: String,
    pub har_dir: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            diagnostics_dir: "output/diagnostics".to_string(),
            har_dir: "output/har_files".to_string(),
        }
    }
}

/// Apply the environment variable overrides named in the external
/// interfaces: `ADB_PATH`, `SIMBA_SERVER_URL`, `HTTP_PORT`,
/// `WEBSOCKET_PORT`, `NODE_ENV`. Only variables that are actually set
/// (and parse, for the numeric ones) override the existing value.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(path) = std::env::var("ADB_PATH") {
        if !path.is_empty() {
            config.adb.adb_path = path;
        }
    }
    if let Ok(url) = std::env::var("SIMBA_SERVER_URL") {
        if !url.is_empty() {
            config.adb.simba_server_url = url;
        }
    }
    if let Ok(port) = std::env::var("HTTP_PORT") {
        if let Ok(port) = port.parse() {
            config.web.http_port = port;
        }
    }
    if let Ok(port) = std::env::var("WEBSOCKET_PORT") {
        if let Ok(port) = port.parse() {
            config.web.websocket_port = port;
        }
    }
    if let Ok(env) = std::env::var("NODE_ENV") {
        if !env.is_empty() {
            config.node_env = env;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = AppConfig::default();
        assert_eq!(config.web.http_port, 8000);
        assert_eq!(config.web.websocket_port, 8080);
        assert_eq!(config.session.handshake_timeout_secs, 10);
        assert_eq!(config.session.pump_join_timeout_secs, 5);
        assert_eq!(config.session.command_timeout_secs, 15);
        assert_eq!(config.session.max_client_buffer_bytes, 8 * 1024 * 1024);
        assert_eq!(config.session.control_queue_capacity, 1024);
    }

    #[test]
    fn env_overrides_apply_only_when_set_and_parseable() {
        // SAFETY: tests run single-threaded within this process for env
        // mutation purposes is not guaranteed by cargo test in general,
        // but this test only reads back values it just set itself and
        // removes them afterward.
        std::env::set_var("HTTP_PORT", "9001");
        std::env::set_var("NODE_ENV", "staging");
        std::env::remove_var("WEBSOCKET_PORT");

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config);

        assert_eq!(config.web.http_port, 9001);
        assert_eq!(config.node_env, "staging");
        assert_eq!(config.web.websocket_port, 8080);

        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("NODE_ENV");
    }
}
