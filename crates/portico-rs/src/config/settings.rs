//! Configuration file loading.

use crate::models::settings::Settings;
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// Upper bound on configuration file size.
const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Loads application configuration from the file system.
///
/// The path comes from the `PORTICO_CONFIG_PATH` environment variable,
/// falling back to `./config.json`. The file is size-capped before reading
/// and the parsed settings are validated before being returned.
///
/// # Errors
///
/// Returns an error when the file is missing, oversized, unparseable, or
/// fails [`Settings::validate`].
pub fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    let config_path =
        std::env::var("PORTICO_CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());

    debug!("Loading configuration from {}", config_path);

    let path = Path::new(&config_path);
    if !path.exists() {
        return Err(format!("Configuration file not found: {}", config_path).into());
    }

    let metadata = fs::metadata(path)?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(format!(
            "Configuration file too large: {} bytes (max {})",
            metadata.len(),
            MAX_CONFIG_SIZE
        )
        .into());
    }

    let content = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", config_path, e))?;

    if let Err(e) = settings.validate() {
        return Err(format!("Invalid configuration: {}", e).into());
    }

    if settings.routes.is_empty() {
        warn!("Configuration contains no routes; the gateway will answer 404 to everything");
    }

    Ok(settings)
}
