//! Configuration file discovery and listen port resolution

use crate::{Error, Result};
use std::path::PathBuf;
use tracing::warn;

/// Locate the active TOML config file for the platform
///
/// `PULSERA_CONFIG` pins an explicit path when set (deployments, tests).
/// Otherwise the conventional locations are tried in order:
/// per-user config directory first, then the system-wide path on Linux.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PULSERA_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Config(format!(
            "PULSERA_CONFIG points at a missing file: {}",
            path.display()
        )));
    }

    if cfg!(target_os = "linux") {
        // Try ~/.config/pulsera/config.toml first, then /etc/pulsera/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("pulsera").join("config.toml"));
        let system_config = PathBuf::from("/etc/pulsera/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else if cfg!(target_os = "macos") || cfg!(target_os = "windows") {
        let path = dirs::config_dir()
            .map(|d| d.join("pulsera").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    } else {
        Err(Error::Config("Unsupported platform".to_string()))
    }
}

/// Read and parse the active config file into a generic TOML table
///
/// Services pull their own section out of the table and deserialize it
/// into a typed config struct.
pub fn load_config_table() -> Result<toml::Value> {
    let path = config_file_path()?;
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Look up a value in a TOML table by dotted key ("episode.port")
pub fn lookup<'a>(table: &'a toml::Value, dotted_key: &str) -> Option<&'a toml::Value> {
    let mut node = table;
    for part in dotted_key.split('.') {
        node = node.get(part)?;
    }
    Some(node)
}

/// Listen port resolution following the shared priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. Compiled default (fallback)
///
/// Logs a warning when more than one source supplies a port so a stale
/// environment variable does not silently shadow the config file.
pub fn resolve_listen_port(
    cli_arg: Option<u16>,
    env_var_name: &str,
    config_file_key: Option<&str>,
    default_port: u16,
) -> u16 {
    let mut sources = Vec::new();

    // Priority 1: Command-line argument
    if cli_arg.is_some() {
        sources.push("command line");
    }

    // Priority 2: Environment variable
    let env_port = std::env::var(env_var_name)
        .ok()
        .and_then(|v| v.parse::<u16>().ok());
    if env_port.is_some() {
        sources.push("environment");
    }

    // Priority 3: TOML config file
    let toml_port = config_file_key.and_then(|key| {
        let table = load_config_table().ok()?;
        lookup(&table, key)
            .and_then(|v| v.as_integer())
            .and_then(|p| u16::try_from(p).ok())
    });
    if toml_port.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "Listen port found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    // Priority 4: Compiled default
    cli_arg.or(env_port).or(toml_port).unwrap_or(default_port)
}
