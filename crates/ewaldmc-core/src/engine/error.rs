use thiserror::Error;

use super::config::ConfigError;
use super::mailbox::MailboxError;
use super::sampling::SamplingError;
use crate::core::forcefield::pair::PairError;
use crate::core::io::record::RecordError;
use crate::core::models::space::SpaceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No trials have been added to the Monte Carlo engine")]
    NoTrials,

    #[error("Energy evaluation failed: {source}")]
    Pair {
        #[from]
        source: PairError,
    },

    #[error("Configuration space error: {source}")]
    Space {
        #[from]
        source: SpaceError,
    },

    #[error("Checkpoint record error: {source}")]
    Record {
        #[from]
        source: RecordError,
    },

    #[error("Invalid engine configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Replica mailbox error: {source}")]
    Mailbox {
        #[from]
        source: MailboxError,
    },

    #[error("Sampling failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write log '{path}': {source}")]
    Log { path: String, source: csv::Error },

    #[error("No activity is set for molecule kind {kind}")]
    MissingActivity { kind: usize },

    #[error("Volume change trials require a pressure")]
    PressureRequired,

    #[error("Failed to reach {target} molecules after {attempts} attempts (reached {reached})")]
    SeekFailed {
        attempts: u64,
        target: usize,
        reached: usize,
    },

    #[error(
        "Failed to compress back to volume {target_volume} after {attempts} attempts (volume {volume})"
    )]
    CompressionFailed {
        attempts: u64,
        volume: f64,
        target_volume: f64,
    },

    #[error("No criteria has been set aside to restore")]
    NoSavedCriteria,

    #[error("A criteria is already set aside; restore it before replacing again")]
    CriteriaAlreadySaved,

    #[error("Unknown trial class '{0}'")]
    UnknownTrial(String),

    #[error("Trial index {index} is out of range for {count} trials")]
    TrialIndex { index: usize, count: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
