//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use ls_core::{ReconstructConfig, ReportDefinition, ReportError, ReportRegistry};
use ls_upstream::RefresherConfig;
use serde::{Deserialize, Serialize};

/// Default upstream endpoint for last-seen data.
pub const DEFAULT_UPSTREAM_URL: &str = "https://sef.podkolzin.consulting/api/users/lastSeen";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the paged upstream roster.
    pub upstream_url: String,

    /// Seconds between refresh cycles.
    pub refresh_interval_secs: u64,

    /// Seconds before a roster fetch is abandoned.
    pub fetch_timeout_secs: u64,

    /// Multiplier on the refresh interval giving the staleness threshold.
    pub staleness_tolerance: f64,

    /// Named reports printed when `watch` exits.
    #[serde(default)]
    pub reports: Vec<ReportDefinition>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("upstream_url", &self.upstream_url)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("staleness_tolerance", &self.staleness_tolerance)
            .field("reports", &self.reports.len())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            refresh_interval_secs: 30,
            fetch_timeout_secs: 10,
            staleness_tolerance: ls_core::interval::DEFAULT_STALENESS_TOLERANCE,
            reports: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (LASTSEEN_*)
        figment = figment.merge(Env::prefixed("LASTSEEN_"));

        figment.extract()
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub const fn refresher_config(&self) -> RefresherConfig {
        RefresherConfig {
            interval: self.refresh_interval(),
            fetch_timeout: self.fetch_timeout(),
            max_cycles: None,
        }
    }

    /// Staleness threshold derived from the refresh interval.
    pub fn reconstruct_config(&self) -> ReconstructConfig {
        let interval = chrono::Duration::from_std(self.refresh_interval())
            .unwrap_or(ls_core::interval::DEFAULT_REFRESH_INTERVAL);
        ReconstructConfig::from_refresh_interval(interval, self.staleness_tolerance)
    }

    /// Collects the configured reports, rejecting duplicate names.
    pub fn report_registry(&self) -> Result<ReportRegistry, ReportError> {
        let mut registry = ReportRegistry::new();
        for definition in &self.reports {
            registry.add(definition.clone())?;
        }
        Ok(registry)
    }
}

/// Returns the platform-specific config directory for lastseen.
///
/// On Linux: `~/.config/lastseen`
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lastseen"))
}
