use crate::core::io::record::{RecordError, RecordWriter, Records};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub const DEFAULT_LOG_INTERVAL: u64 = 1_000_000;
pub const DEFAULT_CHECK_INTERVAL: u64 = 1_000_000;
pub const DEFAULT_CHECK_TOLERANCE: f64 = 1e-7;
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100_000_000;
pub const DEFAULT_PRODUCTION_SUFFIX: &str = "prod";

/// Housekeeping intervals and output locations of a Monte Carlo run.
///
/// An interval of zero disables the corresponding task.
#[derive(Debug, Clone, PartialEq)]
pub struct McConfig {
    pub seed: u64,
    pub log_path: Option<PathBuf>,
    pub log_interval: u64,
    pub check_interval: u64,
    pub check_tolerance: f64,
    pub tune_interval: u64,
    pub checkpoint_path: Option<PathBuf>,
    pub checkpoint_interval: u64,
    pub production_suffix: String,
}

impl McConfig {
    pub(crate) fn write_records(&self, out: &mut RecordWriter) {
        if let Some(path) = &self.log_path {
            out.record("logFileName", path.display());
        }
        out.record("nFreqLog", self.log_interval);
        out.record("nFreqCheckE", self.check_interval);
        out.record("checkEtol", self.check_tolerance);
        out.record("nFreqTune", self.tune_interval);
        out.record("nFreqRestart", self.checkpoint_interval);
        out.record("prodFileAppend", &self.production_suffix);
    }

    /// Restores the housekeeping settings. The seed is irrelevant once the stream is restored.
    pub(crate) fn from_records(records: &Records) -> Result<Self, RecordError> {
        Ok(Self {
            seed: 0,
            log_path: records.optional::<String>("logFileName")?.map(PathBuf::from),
            log_interval: records.or_default("nFreqLog", DEFAULT_LOG_INTERVAL)?,
            check_interval: records.or_default("nFreqCheckE", DEFAULT_CHECK_INTERVAL)?,
            check_tolerance: records.or_default("checkEtol", DEFAULT_CHECK_TOLERANCE)?,
            tune_interval: records.or_default("nFreqTune", 0)?,
            checkpoint_path: None,
            checkpoint_interval: records
                .or_default("nFreqRestart", DEFAULT_CHECKPOINT_INTERVAL)?,
            production_suffix: records
                .or_default("prodFileAppend", DEFAULT_PRODUCTION_SUFFIX.to_string())?,
        })
    }
}

#[derive(Default)]
pub struct McConfigBuilder {
    seed: Option<u64>,
    log_path: Option<PathBuf>,
    log_interval: Option<u64>,
    check_interval: Option<u64>,
    check_tolerance: Option<f64>,
    tune_interval: Option<u64>,
    checkpoint_path: Option<PathBuf>,
    checkpoint_interval: Option<u64>,
    production_suffix: Option<String>,
}

impl McConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }
    pub fn log_interval(mut self, interval: u64) -> Self {
        self.log_interval = Some(interval);
        self
    }
    pub fn check_interval(mut self, interval: u64) -> Self {
        self.check_interval = Some(interval);
        self
    }
    pub fn check_tolerance(mut self, tolerance: f64) -> Self {
        self.check_tolerance = Some(tolerance);
        self
    }
    pub fn tune_interval(mut self, interval: u64) -> Self {
        self.tune_interval = Some(interval);
        self
    }
    pub fn checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = Some(path);
        self
    }
    pub fn checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }
    pub fn production_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.production_suffix = Some(suffix.into());
        self
    }

    pub fn build(self) -> Result<McConfig, ConfigError> {
        let check_tolerance = self.check_tolerance.unwrap_or(DEFAULT_CHECK_TOLERANCE);
        if !(check_tolerance > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "check_tolerance",
                reason: format!("must be positive, got {}", check_tolerance),
            });
        }
        let checkpoint_interval = self
            .checkpoint_interval
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL);
        if self.checkpoint_interval.is_some()
            && checkpoint_interval > 0
            && self.checkpoint_path.is_none()
        {
            return Err(ConfigError::MissingParameter("checkpoint_path"));
        }

        Ok(McConfig {
            seed: self.seed.ok_or(ConfigError::MissingParameter("seed"))?,
            log_path: self.log_path,
            log_interval: self.log_interval.unwrap_or(DEFAULT_LOG_INTERVAL),
            check_interval: self.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL),
            check_tolerance,
            tune_interval: self.tune_interval.unwrap_or(0),
            checkpoint_path: self.checkpoint_path,
            checkpoint_interval,
            production_suffix: self
                .production_suffix
                .unwrap_or_else(|| DEFAULT_PRODUCTION_SUFFIX.to_string()),
        })
    }
}
