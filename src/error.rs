use thiserror::Error;

// ─── Configuration ───────────────────────────────────────────────

/// Raised while parsing a `period=5&cpu&rps=false` style option string.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid stats period {0:?}: expected a number of seconds")]
    InvalidPeriod(String),

    #[error("invalid value {value:?} for stats option '{key}': expected true or false")]
    InvalidFlag { key: String, value: String },
}

// ─── Probes ──────────────────────────────────────────────────────

/// An asynchronous probe could not produce a value. The cycle that ran it
/// is skipped, but the period still closes.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection count query failed: {0}")]
    Connections(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ProbeError {
    /// Wrap any server-side failure of the live-connection query.
    pub fn connections(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Connections(err.into())
    }
}

// ─── Engine ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats engine is already running")]
    AlreadyRunning,

    #[error("stats engine must be started inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("stats period {0:?} cannot be scheduled on this clock")]
    PeriodOutOfRange(std::time::Duration),

    #[error("host probe unavailable: {0}")]
    Host(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
