//! Layered configuration loading.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::{ApexConfig, ConfigError};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "APEX";

/// Configuration loader with a layered approach.
///
/// Later layers override earlier ones:
/// 1. Defaults, or a preset
/// 2. Configuration files (TOML or JSON), merged key by key
/// 3. Variables from a `.env` file, for names not already in the environment
/// 4. Environment variables `PREFIX__SECTION__KEY`
///
/// [`load`](Self::load) validates the result.
///
/// # Example
///
/// ```no_run
/// use apex_config::ConfigLoader;
///
/// # fn main() -> Result<(), apex_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("apex.toml")?
///     .with_dotenv()?
///     .with_env_prefix("APEX")
///     .load()?;
///
/// println!("Server will listen on: {}", config.server.http_addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: Value,
    env_prefix: Option<String>,
    dotenv: BTreeMap<String, String>,
    env_vars: Option<Vec<(String, String)>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader starting from [`ApexConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&ApexConfig::default())
    }

    /// Start from [`ApexConfig::development`].
    ///
    /// ```
    /// use apex_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(self) -> Self {
        self.with_base(&ApexConfig::development())
    }

    /// Start from [`ApexConfig::production`].
    #[must_use]
    pub fn with_production(self) -> Self {
        self.with_base(&ApexConfig::production())
    }

    /// Load configuration from a file. The format follows the extension
    /// (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, or not
    /// valid TOML/JSON.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Missing { path: path.to_path_buf() });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        self.with_string(&content, &format)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`"toml"` or
    /// `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use apex_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:8080"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:8080");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => {
                let table: toml::Table = toml::from_str(content)?;
                serde_json::to_value(table)?
            }
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        merge(&mut self.config, layer);
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `APEX__SERVER__HTTP_ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Read `.env` from the current directory, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        self.with_dotenv_file(".env")
    }

    /// Read variables from a dotenv-style file, if present. They apply only
    /// to names the environment does not already define, and only when an
    /// env prefix is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but cannot be
    /// parsed.
    pub fn with_dotenv_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(self);
        }

        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            self.dotenv.insert(key, value);
        }
        Ok(self)
    }

    /// Use these variables instead of the process environment.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is unknown or unparsable, or if
    /// the merged configuration is invalid.
    pub fn load(self) -> Result<ApexConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is unknown or unparsable, or if
    /// a layer introduced an unknown field.
    pub fn load_unvalidated(mut self) -> Result<ApexConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars = std::mem::take(&mut self.dotenv);
            let current: Vec<(String, String)> = match self.env_vars.take() {
                Some(vars) => vars,
                None => env::vars().collect(),
            };
            vars.extend(current);

            for (key, value) in &vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        Ok(serde_json::from_value(self.config)?)
    }

    fn from_config(config: &ApexConfig) -> Self {
        Self {
            config: serde_json::to_value(config).unwrap_or_else(|_| Value::Object(Map::new())),
            env_prefix: None,
            dotenv: BTreeMap::new(),
            env_vars: None,
        }
    }

    fn with_base(mut self, config: &ApexConfig) -> Self {
        let base = Self::from_config(config);
        self.config = base.config;
        self
    }

    // Sets the setting a `PREFIX__SECTION__KEY` variable names; other
    // variables are ignored.
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
        else {
            return Ok(());
        };

        let unknown = || ConfigError::UnknownVariable { var: key.to_string() };
        let mut parts = rest.split("__").map(str::to_lowercase);
        let (Some(section), Some(field), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(unknown());
        };

        let slot = self
            .config
            .get_mut(&section)
            .and_then(|s| s.get_mut(&field))
            .ok_or_else(unknown)?;

        let parsed = match slot {
            Value::Bool(_) => Value::Bool(
                parse_bool(value).ok_or_else(|| ConfigError::bad_variable(key, "a boolean"))?,
            ),
            Value::Number(_) => Value::Number(
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::bad_variable(key, "an integer"))?
                    .into(),
            ),
            _ => Value::String(value.to_string()),
        };
        *slot = parsed;

        Ok(())
    }
}

/// Deep-merges `layer` into `base`; objects merge key by key, everything
/// else is replaced.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
