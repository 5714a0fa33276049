use crate::models::route::Route;
use serde::{Deserialize, Serialize};

/// Listener configuration for the gateway server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Default upstream timeout in milliseconds, used when a route does not
    /// set its own.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Drain deadline for in-flight requests during shutdown, in seconds.
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5900
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_secs() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            shutdown_timeout_secs: default_shutdown_secs(),
        }
    }
}

/// Application configuration for the portico gateway.
///
/// Typically loaded from a JSON file and validated before the server starts.
///
/// # Configuration File Format
///
/// ```json
/// {
///   "version": 1,
///   "server": {"host": "0.0.0.0", "port": 5900},
///   "trusted_proxies": ["10.0.0.0/8"],
///   "routes": [
///     {
///       "pattern": "/api/users/:id",
///       "methods": ["GET", "PUT"],
///       "target": "http://user-service:8080"
///     }
///   ]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    /// Configuration schema version, currently `1`.
    pub version: u8,

    #[serde(default)]
    pub server: ServerSettings,

    /// Proxies whose `X-Forwarded-For` entries are authoritative when
    /// resolving the client address. IPs or IPv4 CIDR blocks.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    /// Route table, dispatched in declaration order.
    pub routes: Vec<Route>,
}

impl Settings {
    /// Validates every route plus gateway-level settings.
    ///
    /// Returns the first validation error encountered, in declaration order.
    pub fn validate(&self) -> Result<(), String> {
        if self.version != 1 {
            return Err(format!("Unsupported configuration version: {}", self.version));
        }

        if self.server.port == 0 {
            return Err("Server port must be between 1 and 65535".to_string());
        }

        for (i, route) in self.routes.iter().enumerate() {
            route
                .validate()
                .map_err(|e| format!("Route {} ({}): {}", i, route.pattern, e))?;
        }

        Ok(())
    }
}
