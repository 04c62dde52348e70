//! Settings files for the splitfetch binaries.
//!
//! Each binary reads an optional TOML file named `file_name` from the
//! per-user configuration directory:
//!
//! - `$XDG_CONFIG_HOME/splitfetch/` or `~/.config/splitfetch/` on Unix
//! - `%APPDATA%\splitfetch\` on Windows
//!
//! A file passed explicitly (`--config`) must exist; the default one may be
//! absent, in which case the type's `Default` is used.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads `explicit`, or `file_name` from [`config_path`] when `explicit` is
/// `None`.
pub fn load<T>(explicit: Option<&Path>, file_name: &str) -> Result<T, SettingsError>
where
    T: DeserializeOwned + Default,
{
    match explicit {
        Some(path) => load_file(path, true),
        None => load_file(&config_path(file_name), false),
    }
}

fn load_file<T>(path: &Path, required: bool) -> Result<T, SettingsError>
where
    T: DeserializeOwned + Default,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(T::default());
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

/// Returns the platform-specific path of settings file `file_name`.
pub fn config_path(file_name: &str) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("splitfetch").join(file_name)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".config")
            });
        base.join("splitfetch").join(file_name)
    }
}
