//! Bootstrap configuration file resolution and loading
//!
//! Configuration file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config_dir>/vocoach/config.toml`)
//! 4. None: callers fall back to built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "VOCOACH_CONFIG";

/// Resolve which configuration file to load, if any.
///
/// An explicit CLI path or environment path must exist; the per-user file is
/// only used when present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file from {} not found: {}",
                env_var_name,
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    // Priority 3: per-user config file
    if let Some(path) = user_config_file() {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // Priority 4: built-in defaults
    Ok(None)
}

/// Default per-user configuration file path for the platform
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vocoach").join("config.toml"))
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Resolve and load configuration, falling back to `T::default()`
pub fn load_or_default<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_path(cli_arg, env_var_name)? {
        Some(path) => load_toml(&path),
        None => {
            debug!("No configuration file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        rate: u32,
    }

    const TEST_ENV: &str = "VOCOACH_CONFIG_TEST_ONLY";

    #[test]
    #[serial]
    fn test_cli_path_takes_priority() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rate = 24000").unwrap();
        std::env::set_var(TEST_ENV, "/definitely/not/here.toml");

        let resolved = resolve_config_path(Some(file.path()), TEST_ENV).unwrap();
        assert_eq!(resolved.as_deref(), Some(file.path()));

        std::env::remove_var(TEST_ENV);
    }

    #[test]
    #[serial]
    fn test_missing_cli_path_is_error() {
        let result = resolve_config_path(Some(Path::new("/no/such/vocoach.toml")), TEST_ENV);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_path_used_without_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rate = 16000").unwrap();
        std::env::set_var(TEST_ENV, file.path());

        let loaded: Sample = load_or_default(None, TEST_ENV).unwrap();
        assert_eq!(loaded.rate, 16000);

        std::env::remove_var(TEST_ENV);
    }

    #[test]
    fn test_load_toml_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rate = \"not a number\"").unwrap();

        let result: Result<Sample> = load_toml(file.path());
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }
}
