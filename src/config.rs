//! Settings file
//!
//! Settings come from a TOML file, then command-line flags override them.
//! Without `--config` the first existing file of [`DEFAULT_PATHS`] is used;
//! if there is none the built-in defaults apply.
//!
//! ```toml
//! backend = "rkdeveloptool"
//! tool = "/usr/local/bin/rkdeveloptool"
//! lang = "zh"
//!
//! [poll]
//! interval_ms = 2000
//! timeout_ms = 3000
//!
//! [burn]
//! verify = true
//! erase = false
//! reset = true
//! retries = 3
//! timeout = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rkflasher_core::i18n::Lang;
use rkflasher_tool::burn::BurnOptions;
use rkflasher_tool::poller::PollerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Files searched when no `--config` is given
pub const DEFAULT_PATHS: &[&str] = &["rkflasher.toml", "/etc/rkflasher/config.toml"];

/// Allowed range for `burn.retries`
const RETRIES_RANGE: std::ops::RangeInclusive<u32> = 0..=10;

/// Allowed range for `burn.timeout`, in seconds
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 10..=300;

/// Errors loading the settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("{0}")]
    Invalid(String),
}

/// Device poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            timeout_ms: 3000,
        }
    }
}

impl PollSettings {
    pub fn to_config(self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Burn options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BurnSettings {
    /// Verify after writing
    pub verify: bool,
    /// Erase the flash before writing
    pub erase: bool,
    /// Reset the device afterwards
    pub reset: bool,
    /// Extra attempts after a failed write
    pub retries: u32,
    /// Seconds to wait for loader mode
    pub timeout: u64,
}

impl Default for BurnSettings {
    fn default() -> Self {
        Self {
            verify: true,
            erase: false,
            reset: true,
            retries: 3,
            timeout: 30,
        }
    }
}

impl BurnSettings {
    pub fn to_options(self) -> BurnOptions {
        BurnOptions {
            verify: self.verify,
            erase: self.erase,
            reset: self.reset,
            retries: self.retries,
            loader_timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// All settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Backend specification (`rkdeveloptool`, `dummy:mode=maskrom`, ...)
    pub backend: String,
    /// rkdeveloptool binary; looked up on PATH when unset
    pub tool: Option<PathBuf>,
    /// Message language
    pub lang: Lang,
    /// Extra chip database (RON)
    pub chip_db: Option<PathBuf>,
    /// Timeout for short queries, in seconds
    pub query_timeout: u64,
    pub poll: PollSettings,
    pub burn: BurnSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: "rkdeveloptool".to_string(),
            tool: None,
            lang: Lang::default(),
            chip_db: None,
            query_timeout: 10,
            poll: PollSettings::default(),
            burn: BurnSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load one settings file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load `explicit`, or the first default file that exists
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let settings = Self::from_file(path)?;
            log::debug!("Loaded settings from {}", path.display());
            return Ok(settings);
        }

        for candidate in DEFAULT_PATHS.iter().map(Path::new) {
            if candidate.is_file() {
                let settings = Self::from_file(candidate)?;
                log::debug!("Loaded settings from {}", candidate.display());
                return Ok(settings);
            }
        }

        Ok(Self::default())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !RETRIES_RANGE.contains(&self.burn.retries) {
            return Err(ConfigError::Invalid(format!(
                "burn.retries must be between {} and {}",
                RETRIES_RANGE.start(),
                RETRIES_RANGE.end()
            )));
        }
        if !TIMEOUT_RANGE.contains(&self.burn.timeout) {
            return Err(ConfigError::Invalid(format!(
                "burn.timeout must be between {} and {} seconds",
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end()
            )));
        }
        if self.poll.interval_ms == 0 || self.poll.timeout_ms == 0 || self.query_timeout == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Bound for short queries
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Settings, ConfigError> {
        Settings::from_toml_str(text, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file() {
        let settings = parse(
            r#"
            tool = "/opt/rk/rkdeveloptool"
            lang = "zh"

            [burn]
            verify = false
            retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.tool, Some(PathBuf::from("/opt/rk/rkdeveloptool")));
        assert_eq!(settings.lang, Lang::Zh);
        assert_eq!(settings.backend, "rkdeveloptool");

        let options = settings.burn.to_options();
        assert!(!options.verify);
        assert!(options.reset);
        assert_eq!(options.retries, 5);
        assert_eq!(options.loader_timeout, Duration::from_secs(30));
        assert_eq!(settings.poll.to_config(), PollerConfig::default());
    }

    #[test]
    fn test_ranges() {
        assert!(matches!(
            parse("[burn]\nretries = 11"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse("[burn]\ntimeout = 5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(parse("[burn]\ntimeout = 300\nretries = 0").is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            parse("theme = \"dark\""),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rkflasher.toml");
        fs::write(&path, "backend = \"dummy:mode=maskrom\"\n").unwrap();
        assert_eq!(
            Settings::load(Some(&path)).unwrap().backend,
            "dummy:mode=maskrom"
        );
        assert!(matches!(
            Settings::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }
}
