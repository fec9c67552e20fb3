//! Resolution of the sampler's period and feature toggles.
//!
//! Options come from exactly one place, picked once at construction:
//! an explicit option string, else the `STATS_BEAT` environment variable,
//! else the built-in default (disabled).

mod features;

pub use features::FeatureSet;

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Environment variable consulted when no explicit options are given.
pub const ENV_VAR: &str = "STATS_BEAT";

/// Period used when options are present but do not name one.
pub const DEFAULT_PERIOD_SECS: f64 = 5.0;

/// Shortest timer period; smaller positive periods are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Longest timer period; option strings asking for more are rejected.
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Resolved sampler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    /// Seconds between snapshots. Zero or negative disables the engine.
    pub period: f64,
    /// Metrics requested by the caller, before server-dependent ones are
    /// dropped for a server-less start.
    pub features: FeatureSet,
}

impl StatsConfig {
    pub fn new(period_secs: f64) -> Self {
        Self {
            period: period_secs,
            features: FeatureSet::empty(),
        }
    }

    /// The engine stays idle with this configuration.
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    pub fn enable(mut self, features: FeatureSet) -> Self {
        self.features.insert(features);
        self
    }

    pub fn disable(mut self, features: FeatureSet) -> Self {
        self.features.remove(features);
        self
    }

    pub fn with_all(self) -> Self {
        self.enable(FeatureSet::all())
    }

    /// Timer period, or `None` when sampling is switched off. Positive
    /// periods are clamped to [`MIN_PERIOD`]..=[`MAX_PERIOD`].
    pub fn interval(&self) -> Option<Duration> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return None;
        }
        let period = Duration::try_from_secs_f64(self.period).unwrap_or(MAX_PERIOD);
        Some(period.clamp(MIN_PERIOD, MAX_PERIOD))
    }

    /// Resolve from `explicit`, falling back to the `STATS_BEAT` variable.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, |key| std::env::var(key).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment.
    pub fn resolve_with<F>(explicit: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let raw = explicit
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .or_else(|| env(ENV_VAR).filter(|s| !s.trim().is_empty()));

        match raw {
            Some(raw) => raw.parse(),
            None => Ok(Self::disabled()),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl FromStr for StatsConfig {
    type Err = ConfigError;

    /// Parse `period=2&sysload&cpu=false&all`.
    ///
    /// A bare key or `key=true` enables a feature, `key=false` disables it.
    /// `all` turns on every feature not mentioned explicitly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut period = None;
        let mut all = false;
        let mut enabled = FeatureSet::empty();
        let mut mentioned = FeatureSet::empty();

        for pair in s.trim().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim();

            match key {
                "period" => period = Some(parse_period(value)?),
                "all" => all = parse_flag(key, value)?,
                _ => match FeatureSet::lookup(key) {
                    Some(feature) => {
                        mentioned.insert(feature);
                        enabled.set(feature, parse_flag(key, value)?);
                    }
                    None => warn!(option = key, "ignoring unknown stats option"),
                },
            }
        }

        if all {
            enabled.insert(FeatureSet::all().difference(mentioned));
        }

        Ok(Self {
            period: period.unwrap_or(DEFAULT_PERIOD_SECS),
            features: enabled,
        })
    }
}

fn parse_period(value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p <= MAX_PERIOD.as_secs_f64())
        .ok_or_else(|| ConfigError::InvalidPeriod(value.to_owned()))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}
