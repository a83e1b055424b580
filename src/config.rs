//! Configuration of the validator.

use std::{env, fmt, fs, io};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::{LevelFilter, info};
use serde::de;
use serde::{Deserialize, Deserializer};
use url::Url;
use crate::constants::{
    VALIDATOR_APP, VALIDATOR_DEFAULT_CONFIG_FILE, VALIDATOR_ENV_LOG_LEVEL,
    VALIDATOR_ENV_LOG_TYPE,
};
use crate::validation::fetch::{FetchMode, RsyncSettings};
use crate::validation::options::ValidationOptions;


//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn storage_uri() -> Url {
        // The literal is a valid URL, so this cannot fail.
        Url::parse("local://./data").expect("invalid default storage URI")
    }

    fn validation_interval_minutes() -> u64 {
        10
    }

    fn fetch_mode() -> FetchMode {
        FetchMode::Rsync
    }

    fn rsync_command() -> String {
        "rsync".into()
    }

    fn rsync_args() -> Vec<String> {
        vec!["-rt".into(), "--delete".into()]
    }

    fn rsync_timeout_seconds() -> u64 {
        300
    }

    fn cache_dir() -> PathBuf {
        PathBuf::from("./rsync")
    }

    fn scheduler_tick_seconds() -> u64 {
        10
    }

    fn log_level() -> LevelFilter {
        match env::var(VALIDATOR_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!(
                        "Unrecognized value for log level in env var {}, \
                         using 'info'",
                        VALIDATOR_ENV_LOG_LEVEL
                    );
                    LevelFilter::Info
                }
            },
            _ => LevelFilter::Info,
        }
    }

    fn log_type() -> LogType {
        match env::var(VALIDATOR_ENV_LOG_TYPE) {
            Ok(log_type) => match LogType::from_str(&log_type) {
                Ok(log_type) => log_type,
                Err(err) => {
                    eprintln!(
                        "{} in env var {}, using 'stderr'",
                        err, VALIDATOR_ENV_LOG_TYPE
                    );
                    LogType::Stderr
                }
            },
            _ => LogType::Stderr,
        }
    }

    fn syslog_facility() -> String {
        "daemon".into()
    }
}


//------------ Config --------------------------------------------------------

/// Global configuration for the validator.
///
/// This is read from a TOML file, `/etc/rpki-validator.conf` unless another
/// file is given on the command line. Every setting has a default, but at
/// least one trust anchor locator must be configured.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(
        default = "ConfigDefaults::storage_uri",
        alias = "data_dir",
        deserialize_with = "deserialize_storage_uri"
    )]
    pub storage_uri: Url,

    #[serde(default)]
    pub trust_anchor_locators: Vec<PathBuf>,

    pub tal_dir: Option<PathBuf>,

    #[serde(default)]
    pub disabled_trust_anchors: Vec<String>,

    #[serde(default = "ConfigDefaults::validation_interval_minutes")]
    pub validation_interval_minutes: u64,

    #[serde(default)]
    pub max_stale_days: u32,

    #[serde(default)]
    pub loose_validation: bool,

    #[serde(default)]
    pub strict: bool,

    #[serde(default = "ConfigDefaults::fetch_mode")]
    pub fetch_mode: FetchMode,

    #[serde(default = "ConfigDefaults::rsync_command")]
    pub rsync_command: String,

    #[serde(default = "ConfigDefaults::rsync_args")]
    pub rsync_args: Vec<String>,

    #[serde(default = "ConfigDefaults::rsync_timeout_seconds")]
    pub rsync_timeout_seconds: u64,

    #[serde(default = "ConfigDefaults::cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "ConfigDefaults::scheduler_tick_seconds")]
    pub scheduler_tick_seconds: u64,

    pub rankings_file: Option<PathBuf>,

    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "crate::commons::ext_serde::de_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    pub log_file: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,
}

/// # Accessors
impl Config {
    /// Returns how long to wait after a successful validation run.
    pub fn validation_interval(&self) -> chrono::Duration {
        i64::try_from(self.validation_interval_minutes).ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn scheduler_tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler_tick_seconds)
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions::new(
            self.max_stale_days, self.loose_validation, self.strict
        )
    }

    pub fn rsync_settings(&self) -> RsyncSettings {
        RsyncSettings {
            command: self.rsync_command.clone(),
            args: self.rsync_args.clone(),
            timeout: std::time::Duration::from_secs(
                self.rsync_timeout_seconds
            ),
            cache_dir: self.cache_dir.clone(),
        }
    }

    /// Returns all the locator files that make up the anchor set.
    ///
    /// These are the explicitly listed files followed by the `*.tal` files
    /// found in `tal_dir`, sorted by name.
    pub fn locator_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let mut res = self.trust_anchor_locators.clone();
        if let Some(dir) = self.tal_dir.as_ref() {
            let entries = fs::read_dir(dir).map_err(|err| {
                ConfigError::Other(format!(
                    "Cannot read tal_dir '{}': {}", dir.display(), err
                ))
            })?;
            let mut tals = Vec::new();
            for entry in entries {
                let path = entry.map_err(ConfigError::IoError)?.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("tal") {
                    tals.push(path);
                }
            }
            tals.sort();
            res.extend(tals);
        }
        Ok(res)
    }
}

/// # Loading
impl Config {
    /// Creates the config at startup.
    ///
    /// Reads and parses the file, initializes logging, and verifies the
    /// settings.
    pub fn create(config_file: &Path) -> Result<Self, ConfigError> {
        let config = match Self::read_config(config_file) {
            Err(err) => {
                if config_file == Path::new(VALIDATOR_DEFAULT_CONFIG_FILE) {
                    return Err(ConfigError::Other(format!(
                        "Cannot read config file '{}': {}. \
                         Please use --config to specify its location.",
                        config_file.display(), err
                    )))
                }
                return Err(ConfigError::Other(format!(
                    "Error parsing config file: {}, error: {}",
                    config_file.display(), err
                )))
            }
            Ok(config) => config,
        };
        config.init_logging()?;
        info!(
            "{} uses configuration file: {}",
            VALIDATOR_APP, config_file.display()
        );
        config.verify().map_err(|err| {
            ConfigError::Other(format!(
                "Error parsing config file: {}, error: {}",
                config_file.display(), err
            ))
        })?;
        Ok(config)
    }

    pub fn read_config(file: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(file)?;
        Self::parse(&content)
    }

    /// Parses a config from the content of a config file.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.validation_interval_minutes == 0 {
            return Err(ConfigError::other(
                "validation_interval_minutes must be at least 1"
            ))
        }

        if self.scheduler_tick_seconds == 0 {
            return Err(ConfigError::other(
                "scheduler_tick_seconds must be at least 1"
            ))
        }

        if self.log_type == LogType::File && self.log_file.is_none() {
            return Err(ConfigError::other(
                "log_file not configured with log_type = \"file\""
            ))
        }

        if self.trust_anchor_locators.is_empty() && self.tal_dir.is_none() {
            return Err(ConfigError::other(
                "no trust anchors configured, use trust_anchor_locators \
                 or tal_dir"
            ))
        }

        Ok(())
    }
}

/// # Logging
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(),
            LogType::Stderr => self.stderr_logger(),
            LogType::Syslog => self.syslog_logger(),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger().chain(io::stderr()).apply().map_err(|e| {
            ConfigError::Other(format!("Failed to init stderr logging: {e}"))
        })
    }

    /// Creates a file logger using the configured log file.
    fn file_logger(&self) -> Result<(), ConfigError> {
        let path = self.log_file.as_ref().ok_or_else(|| {
            ConfigError::other(
                "log_file not configured with log_type = \"file\""
            )
        })?;
        let file = fern::log_file(path).map_err(|e| {
            ConfigError::Other(format!(
                "Failed to open log file '{}': {}", path.display(), e
            ))
        })?;
        self.fern_logger().chain(file).apply().map_err(|e| {
            ConfigError::Other(format!("Failed to init file logging: {e}"))
        })
    }

    /// Creates a syslog logger for the configured facility.
    #[cfg(unix)]
    fn syslog_logger(&self) -> Result<(), ConfigError> {
        let facility = syslog::Facility::from_str(
            &self.syslog_facility
        ).map_err(|_| ConfigError::other("Invalid syslog_facility"))?;

        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from("rpki-validator"));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| {
                syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514))
            });
        match logger {
            Ok(logger) => {
                self.fern_logger().chain(logger).apply().map_err(|e| {
                    ConfigError::Other(format!("Failed to init syslog: {e}"))
                })
            }
            Err(err) => {
                Err(ConfigError::Other(
                    format!("Cannot connect to syslog: {err}")
                ))
            }
        }
    }

    #[cfg(not(unix))]
    fn syslog_logger(&self) -> Result<(), ConfigError> {
        Err(ConfigError::other("syslog is only supported on Unix systems"))
    }

    /// Creates and returns a fern logger with log level tweaks.
    fn fern_logger(&self) -> fern::Dispatch {
        // suppress overly noisy logging
        let framework_level = self.log_level.min(LevelFilter::Warn);

        let show_target = self.log_level == LevelFilter::Trace
            || self.log_level == LevelFilter::Debug;

        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
            .level_for("mio", framework_level)
            .level_for("tokio", framework_level)
    }
}

fn deserialize_storage_uri<'de, D>(d: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    // A plain path is taken as a directory for the disk backend.
    match Url::parse(&string) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("local://{string}")).map_err(de::Error::custom)
        }
        Err(err) => Err(de::Error::custom(err)),
    }
}


//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(format!(
                "expected \"stderr\", \"file\", or \"syslog\", found: \"{s}\""
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        LogType::from_str(&string).map_err(de::Error::custom)
    }
}


//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}

impl std::error::Error for ConfigError { }


//------------ Tests ---------------------------------------------------------
