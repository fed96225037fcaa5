//! Runtime configuration.
//!
//! A [`Config`] is assembled once, in increasing precedence, from:
//! 1. built-in defaults
//! 2. an optional JSON file (explicit path, or the first hit on the search path)
//! 3. `GDL_*` environment variables
//! 4. explicit [`ConfigOverrides`] (usually from the command line)
//!
//! The result is handed to [`crate::Downloader::new`] and never mutated afterwards.
//! Problems that do not stop loading (unreadable file, unparsable env value) are
//! collected in [`LoadedConfig::warnings`] so the caller can log them once
//! tracing is set up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix shared by all environment overrides.
pub const ENV_PREFIX: &str = "GDL_";

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "gdl_config.json";

const DEFAULT_CHUNK_SIZE: usize = 8192;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OUTPUT_DIR: &str = "./downloads";

/// Errors raised while validating or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its accepted range.
    #[error("invalid configuration value for {field}: {message}")]
    Invalid {
        /// Configuration key.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Serializing the configuration failed.
    #[error("failed to serialize configuration")]
    Serialize(#[from] serde_json::Error),

    /// Writing the configuration file failed.
    #[error("failed to write configuration to {path}")]
    Write {
        /// Destination file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Logging verbosity, spelled the way config files and `GDL_LOG_LEVEL` spell it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// `tracing_subscriber::EnvFilter` directive for this level.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Settings shared by every download made through one [`crate::Downloader`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Write buffer size in bytes.
    pub chunk_size: usize,
    /// Maximum attempts per download, including the first.
    pub max_retries: u32,
    /// Delay in seconds before the first retry; doubled for each later one.
    pub retry_delay: f64,
    /// Connect and per-read timeout in seconds.
    pub timeout: u64,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// Create missing parent directories of output paths.
    pub auto_create_dirs: bool,
    /// Default log verbosity for the command line tool.
    pub log_level: LogLevel,
    /// Default directory for batch downloads.
    pub output_dir: PathBuf,
    /// Fail instead of saving the warning page when no confirmation token is found.
    pub strict_confirmation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
            verify_ssl: true,
            auto_create_dirs: true,
            log_level: LogLevel::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            strict_confirmation: false,
        }
    }
}

/// Shape of the JSON file. Every key is optional and unknown keys are ignored.
#[derive(Debug, Default)]
struct FileConfig {
    chunk_size: Option<usize>,
    max_retries: Option<u32>,
    retry_delay: Option<f64>,
    timeout: Option<u64>,
    verify_ssl: Option<bool>,
    auto_create_dirs: Option<bool>,
    log_level: Option<String>,
    output_dir: Option<PathBuf>,
    strict_confirmation: Option<bool>,
}

impl FileConfig {
    /// Reads each known key on its own so one bad value only drops that key.
    fn from_object(mut object: Map<String, Value>, warnings: &mut Vec<String>) -> Self {
        Self {
            chunk_size: take_key(&mut object, "chunk_size", warnings),
            max_retries: take_key(&mut object, "max_retries", warnings),
            retry_delay: take_key(&mut object, "retry_delay", warnings),
            timeout: take_key(&mut object, "timeout", warnings),
            verify_ssl: take_key(&mut object, "verify_ssl", warnings),
            auto_create_dirs: take_key(&mut object, "auto_create_dirs", warnings),
            log_level: take_key(&mut object, "log_level", warnings),
            output_dir: take_key(&mut object, "output_dir", warnings),
            strict_confirmation: take_key(&mut object, "strict_confirmation", warnings),
        }
    }
}

/// Highest-precedence values, typically taken from command line flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub chunk_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<f64>,
    pub timeout: Option<u64>,
    pub verify_ssl: Option<bool>,
    pub auto_create_dirs: Option<bool>,
    pub log_level: Option<LogLevel>,
    pub output_dir: Option<PathBuf>,
    pub strict_confirmation: Option<bool>,
}

/// A resolved configuration plus what happened while resolving it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The effective configuration.
    pub config: Config,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    /// Non-fatal problems found while loading.
    pub warnings: Vec<String>,
}

impl Config {
    /// Loads configuration from the default search path and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the merged values fail validation.
    pub fn load(
        explicit_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<LoadedConfig, ConfigError> {
        Self::load_from_sources(
            explicit_path,
            &default_search_paths(),
            |key| std::env::var(key).ok(),
            overrides,
        )
    }

    /// Loads configuration from explicit sources.
    ///
    /// `env` resolves an environment variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the merged values fail validation.
    pub fn load_from_sources<F>(
        explicit_path: Option<&Path>,
        search_paths: &[PathBuf],
        env: F,
        overrides: &ConfigOverrides,
    ) -> Result<LoadedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        let candidate = match explicit_path {
            Some(path) if path.is_file() => Some(path.to_path_buf()),
            Some(path) => {
                warnings.push(format!("config file {} not found", path.display()));
                None
            }
            None => search_paths.iter().find(|path| path.is_file()).cloned(),
        };

        let mut source = None;
        if let Some(path) = candidate {
            match read_file_config(&path) {
                Ok(object) => {
                    let file = FileConfig::from_object(object, &mut warnings);
                    config.merge_file(file, &mut warnings);
                    source = Some(path);
                }
                Err(message) => warnings.push(format!(
                    "could not load config file {}: {message}",
                    path.display()
                )),
            }
        }

        config.merge_env(env, &mut warnings);
        config.apply_overrides(overrides);
        config.validate()?;

        Ok(LoadedConfig {
            config,
            source,
            warnings,
        })
    }

    fn merge_file(&mut self, file: FileConfig, warnings: &mut Vec<String>) {
        if let Some(value) = file.chunk_size {
            self.chunk_size = value;
        }
        if let Some(value) = file.max_retries {
            self.max_retries = value;
        }
        if let Some(value) = file.retry_delay {
            self.retry_delay = value;
        }
        if let Some(value) = file.timeout {
            self.timeout = value;
        }
        if let Some(value) = file.verify_ssl {
            self.verify_ssl = value;
        }
        if let Some(value) = file.auto_create_dirs {
            self.auto_create_dirs = value;
        }
        if let Some(value) = file.log_level {
            match value.parse() {
                Ok(level) => self.log_level = level,
                Err(message) => warnings.push(format!("config file log_level: {message}")),
            }
        }
        if let Some(value) = file.output_dir {
            self.output_dir = value;
        }
        if let Some(value) = file.strict_confirmation {
            self.strict_confirmation = value;
        }
    }

    /// Applies `GDL_*` variables resolved through `env`.
    ///
    /// Values that fail to parse are reported and leave the previous value in place.
    pub fn merge_env<F>(&mut self, env: F, warnings: &mut Vec<String>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(&format!("{ENV_PREFIX}{}", key.to_ascii_uppercase()));

        merge_parsed(&lookup, "chunk_size", &mut self.chunk_size, warnings);
        merge_parsed(&lookup, "max_retries", &mut self.max_retries, warnings);
        merge_parsed(&lookup, "retry_delay", &mut self.retry_delay, warnings);
        merge_parsed(&lookup, "timeout", &mut self.timeout, warnings);
        merge_parsed(&lookup, "log_level", &mut self.log_level, warnings);

        for (key, slot) in [
            ("verify_ssl", &mut self.verify_ssl),
            ("auto_create_dirs", &mut self.auto_create_dirs),
            ("strict_confirmation", &mut self.strict_confirmation),
        ] {
            if let Some(raw) = lookup(key) {
                *slot = parse_env_bool(&raw);
            }
        }

        if let Some(raw) = lookup("output_dir") {
            self.output_dir = PathBuf::from(raw);
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let o = overrides.clone();
        self.chunk_size = o.chunk_size.unwrap_or(self.chunk_size);
        self.max_retries = o.max_retries.unwrap_or(self.max_retries);
        self.retry_delay = o.retry_delay.unwrap_or(self.retry_delay);
        self.timeout = o.timeout.unwrap_or(self.timeout);
        self.verify_ssl = o.verify_ssl.unwrap_or(self.verify_ssl);
        self.auto_create_dirs = o.auto_create_dirs.unwrap_or(self.auto_create_dirs);
        self.log_level = o.log_level.unwrap_or(self.log_level);
        if let Some(dir) = o.output_dir {
            self.output_dir = dir;
        }
        self.strict_confirmation = o.strict_confirmation.unwrap_or(self.strict_confirmation);
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero chunk size, a zero timeout or
    /// a negative or non-finite retry delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(ConfigError::Invalid {
                field: "retry_delay",
                message: format!("must be a non-negative number of seconds, got {}", self.retry_delay),
            });
        }
        Ok(())
    }

    /// Base retry delay as a [`Duration`].
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay).unwrap_or(Duration::ZERO)
    }

    /// Connect and read timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Writes the configuration as pretty-printed JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_file_config(path: &Path) -> Result<Map<String, Value>, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    match serde_json::from_str(&contents).map_err(|e| e.to_string())? {
        Value::Object(object) => Ok(object),
        _ => Err("expected a JSON object at the top level".to_string()),
    }
}

fn take_key<T>(object: &mut Map<String, Value>, key: &str, warnings: &mut Vec<String>) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = object.remove(key).filter(|value| !value.is_null())?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warnings.push(format!("config file {key}: {e}, keeping previous value"));
            None
        }
    }
}

fn merge_parsed<T, L>(lookup: &L, key: &str, slot: &mut T, warnings: &mut Vec<String>)
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warnings.push(format!(
            "invalid value '{raw}' for {ENV_PREFIX}{}, keeping previous value",
            key.to_ascii_uppercase()
        )),
    }
}

fn parse_env_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Config file locations tried in order when no explicit path is given.
///
/// 1. `./gdl_config.json`
/// 2. `$HOME/.gdl/config.json`
/// 3. `$XDG_CONFIG_HOME/gdl/config.json`, else `$HOME/.config/gdl/config.json`
#[must_use]
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    let home = env_var_non_empty_os("HOME").map(PathBuf::from);

    if let Some(home) = &home {
        paths.push(home.join(".gdl").join("config.json"));
    }
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg_config_home).join("gdl").join("config.json"));
    } else if let Some(home) = &home {
        paths.push(home.join(".config").join("gdl").join("config.json"));
    }
    paths
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = std::env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
