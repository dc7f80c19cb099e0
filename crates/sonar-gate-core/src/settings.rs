use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::report::OutputFormat;

/// Project key shipped in templates; runs must replace it.
pub const PLACEHOLDER_PROJECT_KEY: &str = "your-project-key";
/// Token shipped in templates; runs must replace it.
pub const PLACEHOLDER_TOKEN: &str = "your-sonar-token";

pub const DEFAULT_SCANNER_VERSION: &str = "6.2.1.4610";
pub const DEFAULT_HOST_URL: &str = "http://localhost:9000";
pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://binaries.sonarsource.com/Distribution/sonar-scanner-cli";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("version pattern is valid"));

/// Resolved configuration for a single run. Read-only once loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub scanner_version: String,
    pub project_key: String,
    pub host_url: String,
    pub token: String,
    pub project_dir: PathBuf,
    pub skip_connectivity_test: bool,
    pub skip_quality_gate_check: bool,
    pub cache_dir: PathBuf,
    pub download_base_url: String,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub output: OutputFormat,
}

/// Partial settings supplied by a higher-precedence layer (usually CLI flags).
#[derive(Debug, Clone, Default)]
pub struct SettingsLayer {
    pub scanner_version: Option<String>,
    pub project_key: Option<String>,
    pub host_url: Option<String>,
    pub token: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub skip_connectivity_test: Option<bool>,
    pub skip_quality_gate_check: Option<bool>,
    pub cache_dir: Option<PathBuf>,
    pub download_base_url: Option<String>,
    pub max_attempts: Option<u32>,
    pub poll_interval: Option<String>,
    pub output: Option<OutputFormat>,
}

/// Reasons a configuration is rejected before any work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("sonar token is not configured; pass --sonar-token or set SONAR_TOKEN")]
    MissingToken,
    #[error("project key is not configured; pass --project-key")]
    MissingProjectKey,
    #[error("sonar host URL must not be empty")]
    EmptyHostUrl,
    #[error("project directory `{}` does not exist", .0.display())]
    MissingProjectDir(PathBuf),
    #[error("max attempts must be at least 1")]
    ZeroAttempts,
    #[error("invalid poll interval `{value}`: {reason}")]
    InvalidPollInterval { value: String, reason: String },
    #[error("invalid output format `{0}` (expected `human` or `json`)")]
    InvalidOutput(String),
}

impl From<ConfigError> for SettingsError {
    fn from(err: ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}

#[derive(Deserialize)]
struct RawSettings {
    scanner_version: String,
    project_key: String,
    host_url: String,
    token: String,
    project_dir: PathBuf,
    skip_connectivity_test: bool,
    skip_quality_gate_check: bool,
    cache_dir: PathBuf,
    download_base_url: String,
    max_attempts: u32,
    poll_interval: String,
    output: String,
}

impl ScanSettings {
    const ENV_PREFIX: &'static str = "SONAR_GATE_";
    const KEYS: [&'static str; 12] = [
        "scanner_version",
        "project_key",
        "host_url",
        "token",
        "project_dir",
        "skip_connectivity_test",
        "skip_quality_gate_check",
        "cache_dir",
        "download_base_url",
        "max_attempts",
        "poll_interval",
        "output",
    ];

    /// Load settings from defaults, an optional config file, `SONAR_GATE_*`
    /// environment variables and finally `overrides`, in increasing precedence.
    pub fn load(
        config_file: Option<&Path>,
        overrides: &SettingsLayer,
    ) -> Result<Self, SettingsError> {
        Self::load_with_env(config_file, overrides, std::env::vars().collect())
    }

    fn load_with_env(
        config_file: Option<&Path>,
        overrides: &SettingsLayer,
        vars: HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        let mut builder = Self::with_defaults(Config::builder())?;
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(Self::ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            if Self::KEYS.contains(&key.as_str()) {
                builder = builder.set_override(key, value)?;
            }
        }
        builder = apply_layer(builder, overrides)?;

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::try_from(raw)
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("scanner_version", DEFAULT_SCANNER_VERSION)?
            .set_default("project_key", PLACEHOLDER_PROJECT_KEY)?
            .set_default("host_url", DEFAULT_HOST_URL)?
            .set_default("token", PLACEHOLDER_TOKEN)?
            .set_default("project_dir", ".")?
            .set_default("skip_connectivity_test", false)?
            .set_default("skip_quality_gate_check", false)?
            .set_default("cache_dir", path_value(&default_cache_dir()))?
            .set_default("download_base_url", DEFAULT_DOWNLOAD_BASE_URL)?
            .set_default("max_attempts", i64::from(DEFAULT_MAX_ATTEMPTS))?
            .set_default(
                "poll_interval",
                humantime::format_duration(DEFAULT_POLL_INTERVAL).to_string(),
            )?
            .set_default("output", OutputFormat::Human.as_str())
    }

    /// Check the invariants every run depends on. A malformed scanner version
    /// is only reported as a warning.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.token.trim().is_empty() || self.token == PLACEHOLDER_TOKEN {
            return Err(SettingsError::MissingToken);
        }
        if self.project_key.trim().is_empty() || self.project_key == PLACEHOLDER_PROJECT_KEY {
            return Err(SettingsError::MissingProjectKey);
        }
        if self.host_url.trim().is_empty() {
            return Err(SettingsError::EmptyHostUrl);
        }
        if !self.project_dir.exists() {
            return Err(SettingsError::MissingProjectDir(self.project_dir.clone()));
        }
        if self.max_attempts == 0 {
            return Err(SettingsError::ZeroAttempts);
        }
        if !self.has_well_formed_version() {
            warn!(
                version = %self.scanner_version,
                "scanner version does not look like N.N.N.N; the download may fail"
            );
        }
        Ok(())
    }

    pub fn has_well_formed_version(&self) -> bool {
        VERSION_PATTERN.is_match(&self.scanner_version)
    }

    /// Host URL without a trailing slash.
    pub fn host_base(&self) -> &str {
        self.host_url.trim_end_matches('/')
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scanner_version: DEFAULT_SCANNER_VERSION.to_string(),
            project_key: PLACEHOLDER_PROJECT_KEY.to_string(),
            host_url: DEFAULT_HOST_URL.to_string(),
            token: PLACEHOLDER_TOKEN.to_string(),
            project_dir: PathBuf::from("."),
            skip_connectivity_test: false,
            skip_quality_gate_check: false,
            cache_dir: default_cache_dir(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            output: OutputFormat::Human,
        }
    }
}

impl fmt::Debug for ScanSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSettings")
            .field("scanner_version", &self.scanner_version)
            .field("project_key", &self.project_key)
            .field("host_url", &self.host_url)
            .field("token", &"<redacted>")
            .field("project_dir", &self.project_dir)
            .field("skip_connectivity_test", &self.skip_connectivity_test)
            .field("skip_quality_gate_check", &self.skip_quality_gate_check)
            .field("cache_dir", &self.cache_dir)
            .field("download_base_url", &self.download_base_url)
            .field("max_attempts", &self.max_attempts)
            .field("poll_interval", &self.poll_interval)
            .field("output", &self.output)
            .finish()
    }
}

impl TryFrom<RawSettings> for ScanSettings {
    type Error = SettingsError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let poll_interval = humantime::parse_duration(raw.poll_interval.trim()).map_err(|err| {
            SettingsError::InvalidPollInterval {
                value: raw.poll_interval.clone(),
                reason: err.to_string(),
            }
        })?;
        let output = raw
            .output
            .parse::<OutputFormat>()
            .map_err(|_| SettingsError::InvalidOutput(raw.output.clone()))?;
        Ok(Self {
            scanner_version: raw.scanner_version.trim().to_string(),
            project_key: raw.project_key,
            host_url: raw.host_url.trim().to_string(),
            token: raw.token,
            project_dir: raw.project_dir,
            skip_connectivity_test: raw.skip_connectivity_test,
            skip_quality_gate_check: raw.skip_quality_gate_check,
            cache_dir: raw.cache_dir,
            download_base_url: raw.download_base_url,
            max_attempts: raw.max_attempts,
            poll_interval,
            output,
        })
    }
}

fn apply_layer(
    mut builder: ConfigBuilder<DefaultState>,
    layer: &SettingsLayer,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder = builder
        .set_override_option("scanner_version", layer.scanner_version.clone())?
        .set_override_option("project_key", layer.project_key.clone())?
        .set_override_option("host_url", layer.host_url.clone())?
        .set_override_option("token", layer.token.clone())?
        .set_override_option("project_dir", layer.project_dir.as_deref().map(path_value))?
        .set_override_option("skip_connectivity_test", layer.skip_connectivity_test)?
        .set_override_option("skip_quality_gate_check", layer.skip_quality_gate_check)?
        .set_override_option("cache_dir", layer.cache_dir.as_deref().map(path_value))?
        .set_override_option("download_base_url", layer.download_base_url.clone())?
        .set_override_option("max_attempts", layer.max_attempts.map(i64::from))?
        .set_override_option("poll_interval", layer.poll_interval.clone())?
        .set_override_option("output", layer.output.map(|o| o.as_str()))?;
    Ok(builder)
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sonar-gate")
}
