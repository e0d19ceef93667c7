mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding `stream.stream_key`.
pub const STREAM_KEY_ENV: &str = "STREAM_KEY";

/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

const DEFAULT_PATHS: [&str; 4] = [
    "./loopcast.toml",
    "./config.toml",
    "~/.config/loopcast/config.toml",
    "/etc/loopcast/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

/// Locate the config file to use: the custom path if given, otherwise the
/// first default location that exists.
pub fn find_config_file(custom_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = custom_path {
        return Some(path.to_path_buf());
    }

    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    match find_config_file(custom_path) {
        Some(path) => load_config(&path),
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config)?;
            validate_config(&config)?;
            Ok(config)
        }
    }
}

/// Directory that relative stream paths are resolved against.
pub fn base_dir(config_file: Option<&Path>) -> PathBuf {
    config_file
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

/// Apply `STREAM_KEY` and `PORT` from the process environment.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(STREAM_KEY_ENV) {
        config.stream.stream_key = Some(key);
    }

    if let Some(port) = lookup(PORT_ENV) {
        config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {:?}", PORT_ENV, port))?;
    }

    Ok(())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.stream.ingest_url.trim().is_empty() {
        anyhow::bail!("Stream ingest_url cannot be empty");
    }

    if config.stream.stream_key.is_none() {
        tracing::warn!(
            "No stream key configured; using the local testing default. Set {} for production",
            STREAM_KEY_ENV
        );
    }

    if let Some(ref cookies) = config.tools.cookies_file {
        if !cookies.exists() {
            tracing::warn!("Cookies file does not exist: {:?}", cookies);
        }
    }

    Ok(())
}
