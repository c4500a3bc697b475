//! Trial moves.
//!
//! A trial proposes one kind of change to the [`System`], asks the pair potential for the
//! energy change, hands the acceptance ratio to the criteria and then commits or discards.
//! Every trial kind is a variant of [`TrialKind`]; [`Trial`] adds the bookkeeping shared by
//! all of them (acceptance statistics, step-size tuning and checkpoint records).

mod config_bias;
mod exchange;
pub mod replica;
mod translate;
mod volume;

pub use replica::{Overlap, ReplicaSwap};

use super::criteria::AcceptanceStats;
use super::error::EngineError;
use super::rng::McRng;
use super::system::System;
use crate::core::io::record::{RecordWriter, Records};
use crate::core::models::space::Space;
use phf::{Map, phf_map};
use rand::Rng;
use std::path::Path;
use tracing::debug;

/// Acceptance fraction the tuner steers step sizes towards.
pub const TARGET_ACCEPTANCE: f64 = 0.25;
const TUNE_GROW: f64 = 1.05;
const TUNE_SHRINK: f64 = 0.95;
const MIN_TRANSLATION: f64 = 1e-5;
const MIN_LN_VOLUME: f64 = 1e-6;
const MAX_LN_VOLUME: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrialClass {
    Insert,
    Delete,
    Translate,
    VolumeChange,
    ConfigBias,
    ReplicaSwap,
}

static TRIAL_CLASSES: Map<&'static str, TrialClass> = phf_map! {
    "Insert" => TrialClass::Insert,
    "Delete" => TrialClass::Delete,
    "Translate" => TrialClass::Translate,
    "VolumeChange" => TrialClass::VolumeChange,
    "ConfigBias" => TrialClass::ConfigBias,
    "ReplicaSwap" => TrialClass::ReplicaSwap,
};

/// Result of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Accepted,
    Rejected,
    /// Nothing was attempted; the attempt does not count towards trial statistics.
    Skipped,
}

#[derive(Debug, Clone)]
pub enum TrialKind {
    /// Grand-canonical insertion of a molecule of `kind` at a random position and orientation.
    Insert { kind: usize },
    /// Grand-canonical deletion of a random molecule of `kind`.
    Delete { kind: usize },
    /// Rigid translation of a random molecule within a cube of half-width `max_move`.
    Translate { max_move: f64 },
    /// Random walk in `ln V` with step at most `max_ln_volume`.
    VolumeChange { max_ln_volume: f64 },
    /// Multiple-try translation over `candidates` trial displacements.
    ConfigBias { candidates: usize, max_move: f64 },
    /// Configuration exchange with replicas in overlapping windows.
    ReplicaSwap(ReplicaSwap),
}

impl TrialKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "Insert",
            Self::Delete { .. } => "Delete",
            Self::Translate { .. } => "Translate",
            Self::VolumeChange { .. } => "VolumeChange",
            Self::ConfigBias { .. } => "ConfigBias",
            Self::ReplicaSwap(_) => "ReplicaSwap",
        }
    }

    fn step(&self) -> Option<f64> {
        match self {
            Self::Translate { max_move } | Self::ConfigBias { max_move, .. } => Some(*max_move),
            Self::VolumeChange { max_ln_volume } => Some(*max_ln_volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trial {
    kind: TrialKind,
    stats: AcceptanceStats,
    /// Statistics since the last tuning.
    window: AcceptanceStats,
}

impl Trial {
    pub fn new(kind: TrialKind) -> Self {
        Self {
            kind,
            stats: AcceptanceStats::default(),
            window: AcceptanceStats::default(),
        }
    }

    pub fn insert(kind: usize) -> Self {
        Self::new(TrialKind::Insert { kind })
    }

    pub fn delete(kind: usize) -> Self {
        Self::new(TrialKind::Delete { kind })
    }

    pub fn translate(max_move: f64) -> Self {
        Self::new(TrialKind::Translate { max_move })
    }

    pub fn volume_change(max_ln_volume: f64) -> Self {
        Self::new(TrialKind::VolumeChange { max_ln_volume })
    }

    pub fn config_bias(candidates: usize, max_move: f64) -> Self {
        Self::new(TrialKind::ConfigBias {
            candidates: candidates.max(1),
            max_move,
        })
    }

    pub fn replica_swap(swap: ReplicaSwap) -> Self {
        Self::new(TrialKind::ReplicaSwap(swap))
    }

    pub fn kind(&self) -> &TrialKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut TrialKind {
        &mut self.kind
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn stats(&self) -> AcceptanceStats {
        self.stats
    }

    pub fn attempt(&mut self, system: &mut System, rng: &mut McRng) -> Result<TrialOutcome, EngineError> {
        let outcome = match &mut self.kind {
            TrialKind::Insert { kind } => exchange::insert(system, rng, *kind)?,
            TrialKind::Delete { kind } => exchange::delete(system, rng, *kind)?,
            TrialKind::Translate { max_move } => translate::attempt(system, rng, *max_move)?,
            TrialKind::VolumeChange { max_ln_volume } => {
                volume::attempt(system, rng, *max_ln_volume)?
            }
            TrialKind::ConfigBias {
                candidates,
                max_move,
            } => config_bias::attempt(system, rng, *candidates, *max_move)?,
            TrialKind::ReplicaSwap(swap) => swap.attempt(system, rng)?,
        };
        match outcome {
            TrialOutcome::Accepted => {
                for s in [&mut self.stats, &mut self.window] {
                    s.attempted += 1;
                    s.accepted += 1;
                }
            }
            TrialOutcome::Rejected => {
                self.stats.attempted += 1;
                self.window.attempted += 1;
            }
            TrialOutcome::Skipped => {}
        }
        Ok(outcome)
    }

    /// Scales the step size towards the target acceptance using the attempts since the last call.
    pub fn tune_parameters(&mut self, space: &Space) {
        if self.window.attempted == 0 {
            return;
        }
        let factor = if self.window.fraction() > TARGET_ACCEPTANCE {
            TUNE_GROW
        } else {
            TUNE_SHRINK
        };
        let max_translation = (0.5 * space.min_length()).max(MIN_TRANSLATION);
        match &mut self.kind {
            TrialKind::Translate { max_move } | TrialKind::ConfigBias { max_move, .. } => {
                *max_move = (*max_move * factor).clamp(MIN_TRANSLATION, max_translation);
            }
            TrialKind::VolumeChange { max_ln_volume } => {
                *max_ln_volume = (*max_ln_volume * factor).clamp(MIN_LN_VOLUME, MAX_LN_VOLUME);
            }
            _ => {}
        }
        debug!(
            trial = self.class_name(),
            acceptance = self.window.fraction(),
            step = ?self.kind.step(),
            "Tuned trial step size."
        );
        self.window = AcceptanceStats::default();
    }

    pub fn zero_stat(&mut self) {
        self.stats = AcceptanceStats::default();
        self.window = AcceptanceStats::default();
    }

    pub fn stat_header(&self) -> Vec<String> {
        let name = self.class_name();
        let mut header = vec![format!("{}Acc", name)];
        if self.kind.step().is_some() {
            header.push(format!("{}Max", name));
        }
        header
    }

    pub fn stat_values(&self) -> Vec<String> {
        let mut values = vec![format!("{}", self.stats.fraction())];
        if let Some(step) = self.kind.step() {
            values.push(format!("{}", step));
        }
        values
    }

    pub fn write_records(&self, out: &mut RecordWriter) {
        out.class(self.class_name());
        out.record("attempted", self.stats.attempted);
        out.record("accepted", self.stats.accepted);
        out.record("windowAttempted", self.window.attempted);
        out.record("windowAccepted", self.window.accepted);
        match &self.kind {
            TrialKind::Insert { kind } | TrialKind::Delete { kind } => {
                out.record("molKind", kind);
            }
            TrialKind::Translate { max_move } => out.record("maxMove", max_move),
            TrialKind::VolumeChange { max_ln_volume } => out.record("maxLnV", max_ln_volume),
            TrialKind::ConfigBias {
                candidates,
                max_move,
            } => {
                out.record("nCandidates", candidates);
                out.record("maxMove", max_move);
            }
            TrialKind::ReplicaSwap(swap) => swap.write_records(out),
        }
    }

    pub fn from_records(records: &Records) -> Result<Self, EngineError> {
        let tag = records.class()?;
        let class = TRIAL_CLASSES
            .get(tag)
            .copied()
            .ok_or_else(|| EngineError::UnknownTrial(tag.to_string()))?;
        let kind = match class {
            TrialClass::Insert => TrialKind::Insert {
                kind: records.required("molKind")?,
            },
            TrialClass::Delete => TrialKind::Delete {
                kind: records.required("molKind")?,
            },
            TrialClass::Translate => TrialKind::Translate {
                max_move: records.required("maxMove")?,
            },
            TrialClass::VolumeChange => TrialKind::VolumeChange {
                max_ln_volume: records.required("maxLnV")?,
            },
            TrialClass::ConfigBias => TrialKind::ConfigBias {
                candidates: records.required("nCandidates")?,
                max_move: records.required("maxMove")?,
            },
            TrialClass::ReplicaSwap => TrialKind::ReplicaSwap(ReplicaSwap::from_records(records)?),
        };
        Ok(Self {
            kind,
            stats: AcceptanceStats {
                attempted: records.or_default("attempted", 0)?,
                accepted: records.or_default("accepted", 0)?,
            },
            window: AcceptanceStats {
                attempted: records.or_default("windowAttempted", 0)?,
                accepted: records.or_default("windowAccepted", 0)?,
            },
        })
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), EngineError> {
        let mut out = RecordWriter::new();
        self.write_records(&mut out);
        Ok(out.write_to_path(path)?)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, EngineError> {
        Self::from_records(&Records::read(path)?)
    }
}

/// Picks a molecule uniformly, optionally restricted to one kind.
pub(crate) fn pick_molecule(system: &System, rng: &mut McRng, kind: Option<usize>) -> Option<usize> {
    let molecules = system.space.molecules();
    match kind {
        None if molecules.is_empty() => None,
        None => Some(rng.gen_range(0..molecules.len())),
        Some(kind) => {
            let count = system.space.n_molecules_of(kind);
            if count == 0 {
                return None;
            }
            let nth = rng.gen_range(0..count);
            molecules
                .iter()
                .enumerate()
                .filter(|(_, m)| m.kind == kind)
                .nth(nth)
                .map(|(i, _)| i)
        }
    }
}
