//! Engine configuration.
//!
//! A config is a JSON object with two required fields, `version` and
//! `directory`, plus an optional `engine` selector. Unknown keys are
//! ignored so configs can round-trip through newer writers. An empty
//! config string is the documented shorthand for an in-memory store.

use std::fmt;
use std::path::PathBuf;

/// Environment variable recognised by test harnesses: overrides the
/// configured directory.
pub const TEST_PATH_ENV_VAR: &str = "OMNIKV_TEST_PATH";

/// Which backend the store should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-memory transactional engine.
    #[default]
    Mem,
    /// Embedded ordered store.
    Ordered,
    /// Embedded log-structured merge store.
    Lsm,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mem => f.write_str("mem"),
            Self::Ordered => f.write_str("ordered"),
            Self::Lsm => f.write_str("lsm"),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RawConfig {
    version: Option<String>,
    directory: Option<PathBuf>,
    #[serde(default)]
    engine: Option<EngineKind>,
}

/// Parsed engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub version: String,
    pub directory: Option<PathBuf>,
    pub engine: EngineKind,
}

impl StoreConfig {
    /// An in-memory store with no backing directory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            version: "1.0".to_owned(),
            directory: None,
            engine: EngineKind::Mem,
        }
    }

    /// Parse a config string.
    ///
    /// The empty string (or all-whitespace) selects the in-memory default.
    /// Anything else must be a JSON object carrying `version` and
    /// `directory`; unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] on malformed JSON or absent required keys.
    pub fn parse(config: &str) -> Result<Self, ConfigError> {
        if config.trim().is_empty() {
            return Ok(Self::in_memory());
        }
        let raw: RawConfig =
            serde_json::from_str(config).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let version = raw.version.ok_or(ConfigError::MissingField("version"))?;
        let directory = raw.directory.ok_or(ConfigError::MissingField("directory"))?;
        Ok(Self {
            version,
            directory: Some(directory),
            engine: raw.engine.unwrap_or_default(),
        })
    }

    /// The effective directory after the test-harness override.
    #[must_use]
    pub fn effective_directory(&self) -> Option<PathBuf> {
        match std::env::var(TEST_PATH_ENV_VAR) {
            Ok(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => self.directory.clone(),
        }
    }
}

/// Error produced when a config string cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Not a JSON object.
    Malformed(String),
    /// A required key is absent.
    MissingField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed config: {detail}"),
            Self::MissingField(field) => write!(f, "config is missing required field '{field}'"),
        }
    }
}

impl std::error::Error for ConfigError {}
