use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the local hospital cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Nearby-hospital lookup and caching policy
    #[serde(default)]
    pub hospitals: HospitalsConfig,

    /// How the device position is obtained
    #[serde(default)]
    pub location: LocationConfig,

    /// Reachability probe settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalsConfig {
    /// Overpass interpreter endpoint
    pub overpass_url: String,

    /// Search radius around the device, in meters
    pub search_radius_meters: f64,

    /// Maximum number of hospitals kept per fetch
    pub max_results: usize,

    /// Periodic refresh interval in minutes
    pub refresh_minutes: u32,

    /// Cached results younger than this are reused
    pub max_cache_age_minutes: u32,

    /// Moving further than this from the cached origin forces a fetch
    pub relocation_threshold_meters: f64,

    /// Cached results older than this are purged
    pub cache_expiry_days: u32,

    /// Retries for transient Overpass failures
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
}

fn default_fetch_retries() -> u32 {
    2
}

impl Default for HospitalsConfig {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            search_radius_meters: 10_000.0,
            max_results: 15,
            refresh_minutes: 5,
            max_cache_age_minutes: 60,
            relocation_threshold_meters: 10_000.0,
            cache_expiry_days: 7,
            fetch_retries: default_fetch_retries(),
        }
    }
}

/// Coordinates pinned in the config file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Use these coordinates instead of looking the position up
    #[serde(default)]
    pub fixed: Option<FixedLocation>,

    /// IP geolocation endpoint used when no fixed position is set
    pub ip_lookup_url: String,

    /// Give up on a position fix after this many seconds
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fixed: None,
            ip_lookup_url: "https://ipapi.co/json/".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Host hit with a HEAD request to decide reachability
    pub probe_url: String,

    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: "https://www.google.com/favicon.ico".to_string(),
            probe_timeout_secs: 5,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("healthmate")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            hospitals: HospitalsConfig::default(),
            location: LocationConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from the default location and validate it
    ///
    /// A missing file is created with defaults. Warnings are logged; errors
    /// fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        let path = Self::config_path().map_err(|e| ConfigError::Invalid(format!("{:#}", e)))?;
        Self::load_validated_from(&path)
    }

    pub fn load_validated_from(path: &Path) -> Result<(Self, ValidationResult), ConfigError> {
        let config =
            Self::load_from(path).map_err(|e| ConfigError::ParseError(format!("{:#}", e)))?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(
            &self.hospitals.overpass_url,
            "hospitals.overpass_url",
            &mut result,
        );
        self.validate_url(
            &self.location.ip_lookup_url,
            "location.ip_lookup_url",
            &mut result,
        );
        self.validate_url(
            &self.connectivity.probe_url,
            "connectivity.probe_url",
            &mut result,
        );

        let hospitals = &self.hospitals;
        if hospitals.search_radius_meters <= 0.0 {
            result.add_error(
                "hospitals.search_radius_meters",
                "Search radius must be greater than 0",
            );
        } else if hospitals.search_radius_meters > 50_000.0 {
            result.add_warning(
                "hospitals.search_radius_meters",
                "Search radius is unusually large (>50km); Overpass may time out",
            );
        }

        if hospitals.max_results == 0 {
            result.add_error("hospitals.max_results", "At least one result must be kept");
        }

        if hospitals.refresh_minutes == 0 {
            result.add_warning(
                "hospitals.refresh_minutes",
                "Periodic refresh disabled (0 minutes)",
            );
        } else if hospitals.refresh_minutes > 1440 {
            result.add_warning(
                "hospitals.refresh_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        if hospitals.relocation_threshold_meters <= 0.0 {
            result.add_error(
                "hospitals.relocation_threshold_meters",
                "Relocation threshold must be greater than 0",
            );
        }

        if hospitals.cache_expiry_days == 0 {
            result.add_warning(
                "hospitals.cache_expiry_days",
                "Cache expiry of 0 days discards every cached result",
            );
        }

        if let Some(fixed) = self.location.fixed {
            if !(-90.0..=90.0).contains(&fixed.latitude) {
                result.add_error("location.fixed.latitude", "Latitude must be within -90..90");
            }
            if !(-180.0..=180.0).contains(&fixed.longitude) {
                result.add_error(
                    "location.fixed.longitude",
                    "Longitude must be within -180..180",
                );
            }
        }

        if self.location.timeout_secs == 0 {
            result.add_error("location.timeout_secs", "Timeout must be greater than 0");
        }

        if self.connectivity.probe_timeout_secs == 0 {
            result.add_error(
                "connectivity.probe_timeout_secs",
                "Timeout must be greater than 0",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("healthmate");

        Ok(config_dir.join("config.toml"))
    }
}
