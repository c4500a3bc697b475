use crate::core::io::record::{RecordError, RecordWriter, Records};
use crate::engine::rng::McRng;
use std::path::Path;
use tracing::trace;

/// The kind of move an acceptance query comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTag {
    Insert,
    Delete,
    Translate,
    VolumeChange,
    ConfigBias,
    Swap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceQuery {
    /// Log of the unbiased acceptance ratio.
    pub ln_ratio: f64,
    /// Total potential energy if the move is accepted.
    pub energy: f64,
    pub tag: MoveTag,
    /// Macrostate (molecule count) if the move is accepted.
    pub macrostate: f64,
}

/// Temperature and chemical-potential state shared by all acceptance rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Thermo {
    pub beta: f64,
    /// Activity `z = exp(βμ)/Λ³` per molecule kind, in Å⁻³.
    pub activities: Vec<f64>,
    pub pressure: Option<f64>,
}

impl Thermo {
    pub fn new(beta: f64, activities: Vec<f64>) -> Self {
        Self {
            beta,
            activities,
            pressure: None,
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceStats {
    pub attempted: u64,
    pub accepted: u64,
}

impl AcceptanceStats {
    pub fn fraction(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

/// A flat-histogram bias over a binned macrostate range.
///
/// Moves leaving the range are rejected. Every decision adds `ln_f` to the bias of the
/// bin the system ends up in, which pushes the walk away from visited macrostates.
#[derive(Debug, Clone, PartialEq)]
pub struct MacrostateBias {
    pub min: f64,
    pub max: f64,
    pub ln_pi: Vec<f64>,
    pub visits: Vec<u64>,
    pub ln_f: f64,
    pub current: usize,
}

impl MacrostateBias {
    pub fn new(min: f64, max: f64, bins: usize, ln_f: f64, current: f64) -> Self {
        let bins = bins.max(1);
        let mut bias = Self {
            min,
            max,
            ln_pi: vec![0.0; bins],
            visits: vec![0; bins],
            ln_f,
            current: 0,
        };
        bias.current = bias.bin(current).unwrap_or(0);
        bias
    }

    pub fn bin(&self, macrostate: f64) -> Option<usize> {
        if macrostate < self.min || macrostate >= self.max {
            return None;
        }
        let width = (self.max - self.min) / self.ln_pi.len() as f64;
        let bin = ((macrostate - self.min) / width) as usize;
        Some(bin.min(self.ln_pi.len() - 1))
    }
}

/// Acceptance rules. Both variants carry the same thermodynamic state.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Metropolis {
        thermo: Thermo,
        stats: AcceptanceStats,
    },
    MultiMacrostate {
        thermo: Thermo,
        stats: AcceptanceStats,
        bias: MacrostateBias,
    },
}

impl Criteria {
    pub fn metropolis(thermo: Thermo) -> Self {
        Self::Metropolis {
            thermo,
            stats: AcceptanceStats::default(),
        }
    }

    pub fn multi_macrostate(thermo: Thermo, bias: MacrostateBias) -> Self {
        Self::MultiMacrostate {
            thermo,
            stats: AcceptanceStats::default(),
            bias,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Metropolis { .. } => "Metropolis",
            Self::MultiMacrostate { .. } => "MultiMacrostate",
        }
    }

    pub fn thermo(&self) -> &Thermo {
        match self {
            Self::Metropolis { thermo, .. } | Self::MultiMacrostate { thermo, .. } => thermo,
        }
    }

    pub fn thermo_mut(&mut self) -> &mut Thermo {
        match self {
            Self::Metropolis { thermo, .. } | Self::MultiMacrostate { thermo, .. } => thermo,
        }
    }

    pub fn stats(&self) -> AcceptanceStats {
        match self {
            Self::Metropolis { stats, .. } | Self::MultiMacrostate { stats, .. } => *stats,
        }
    }

    pub fn beta(&self) -> f64 {
        self.thermo().beta
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.thermo_mut().beta = beta;
    }

    pub fn activity(&self, kind: usize) -> Option<f64> {
        self.thermo().activities.get(kind).copied()
    }

    pub fn set_activity(&mut self, kind: usize, activity: f64) {
        let activities = &mut self.thermo_mut().activities;
        if activities.len() <= kind {
            activities.resize(kind + 1, 0.0);
        }
        activities[kind] = activity;
    }

    pub fn pressure(&self) -> Option<f64> {
        self.thermo().pressure
    }

    pub fn set_pressure(&mut self, pressure: Option<f64>) {
        self.thermo_mut().pressure = pressure;
    }

    pub fn zero_stat(&mut self) {
        match self {
            Self::Metropolis { stats, .. } => *stats = AcceptanceStats::default(),
            Self::MultiMacrostate { stats, bias, .. } => {
                *stats = AcceptanceStats::default();
                bias.visits.iter_mut().for_each(|v| *v = 0);
            }
        }
    }

    /// Decides a move. Exactly one uniform number is drawn per call.
    pub fn accept(&mut self, query: &AcceptanceQuery, rng: &mut McRng) -> bool {
        let u = rng.uniform();
        let accepted = match self {
            Self::Metropolis { stats, .. } => {
                stats.attempted += 1;
                let accepted = query.ln_ratio >= 0.0 || u < query.ln_ratio.exp();
                stats.accepted += u64::from(accepted);
                accepted
            }
            Self::MultiMacrostate { stats, bias, .. } => {
                stats.attempted += 1;
                let accepted = match bias.bin(query.macrostate) {
                    None => false,
                    Some(next) => {
                        let ln_total = query.ln_ratio + bias.ln_pi[bias.current] - bias.ln_pi[next];
                        let accepted = ln_total >= 0.0 || u < ln_total.exp();
                        if accepted {
                            bias.current = next;
                        }
                        accepted
                    }
                };
                bias.visits[bias.current] += 1;
                bias.ln_pi[bias.current] += bias.ln_f;
                stats.accepted += u64::from(accepted);
                accepted
            }
        };
        trace!(ln_ratio = query.ln_ratio, tag = ?query.tag, accepted, "Acceptance decision.");
        accepted
    }

    pub fn write_records(&self, out: &mut RecordWriter) {
        out.class(self.class_name());
        let thermo = self.thermo();
        out.record("beta", thermo.beta);
        out.list("activities", &thermo.activities);
        if let Some(p) = thermo.pressure {
            out.record("pressure", p);
        }
        let stats = self.stats();
        out.record("attempted", stats.attempted);
        out.record("accepted", stats.accepted);
        if let Self::MultiMacrostate { bias, .. } = self {
            out.record("mMin", bias.min);
            out.record("mMax", bias.max);
            out.record("nBins", bias.ln_pi.len());
            out.record("lnf", bias.ln_f);
            out.record("currentBin", bias.current);
            out.list("lnPI", &bias.ln_pi);
            out.list("visits", &bias.visits);
        }
    }

    pub fn from_records(records: &Records) -> Result<Self, RecordError> {
        let thermo = Thermo {
            beta: records.required("beta")?,
            activities: records.list("activities")?,
            pressure: records.optional("pressure")?,
        };
        let stats = AcceptanceStats {
            attempted: records.or_default("attempted", 0)?,
            accepted: records.or_default("accepted", 0)?,
        };
        match records.class()? {
            "Metropolis" => Ok(Self::Metropolis { thermo, stats }),
            "MultiMacrostate" => {
                let bins: usize = records.required("nBins")?;
                let ln_pi: Vec<f64> = records.list("lnPI")?;
                let visits: Vec<u64> = records.list("visits")?;
                if ln_pi.len() != bins || visits.len() != bins {
                    return Err(records.invalid("nBins", bins.to_string()));
                }
                let current: usize = records.required("currentBin")?;
                if current >= bins {
                    return Err(records.invalid("currentBin", current.to_string()));
                }
                let bias = MacrostateBias {
                    min: records.required("mMin")?,
                    max: records.required("mMax")?,
                    ln_pi,
                    visits,
                    ln_f: records.or_default("lnf", 0.0)?,
                    current,
                };
                Ok(Self::MultiMacrostate {
                    thermo,
                    stats,
                    bias,
                })
            }
            other => Err(RecordError::ClassMismatch {
                expected: "Metropolis or MultiMacrostate".to_string(),
                found: other.to_string(),
                path: records.source().to_string(),
            }),
        }
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), RecordError> {
        let mut out = RecordWriter::new();
        self.write_records(&mut out);
        out.write_to_path(path)
    }

    pub fn read_from_path(path: &Path) -> Result<Self, RecordError> {
        Self::from_records(&Records::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(ln_ratio: f64, macrostate: f64) -> AcceptanceQuery {
        AcceptanceQuery {
            ln_ratio,
            energy: 0.0,
            tag: MoveTag::Insert,
            macrostate,
        }
    }

    #[test]
    fn metropolis_always_accepts_downhill_moves() {
        let mut criteria = Criteria::metropolis(Thermo::new(1.0, vec![1.0]));
        let mut rng = McRng::seed_from_u64(5);
        for _ in 0..100 {
            assert!(criteria.accept(&query(0.5, 0.0), &mut rng));
        }
        assert_eq!(criteria.stats().fraction(), 1.0);
    }

    #[test]
    fn metropolis_acceptance_rate_matches_boltzmann_factor() {
        let mut criteria = Criteria::metropolis(Thermo::new(1.0, vec![1.0]));
        let mut rng = McRng::seed_from_u64(5);
        let n = 100_000;
        for _ in 0..n {
            criteria.accept(&query(-1.0, 0.0), &mut rng);
        }
        assert!((criteria.stats().fraction() - (-1.0f64).exp()).abs() < 0.01);
    }

    #[test]
    fn multi_macrostate_rejects_outside_range() {
        let bias = MacrostateBias::new(-0.5, 10.5, 11, 0.0, 5.0);
        let mut criteria = Criteria::multi_macrostate(Thermo::new(1.0, vec![1.0]), bias);
        let mut rng = McRng::seed_from_u64(5);
        assert!(!criteria.accept(&query(100.0, 11.0), &mut rng));
        assert!(!criteria.accept(&query(100.0, -1.0), &mut rng));
        assert!(criteria.accept(&query(100.0, 6.0), &mut rng));
    }

    #[test]
    fn flat_histogram_bias_pushes_walk_out_of_visited_bins() {
        let bias = MacrostateBias::new(-0.5, 2.5, 3, 1.0, 0.0);
        let mut criteria = Criteria::multi_macrostate(Thermo::new(1.0, vec![1.0]), bias);
        let mut rng = McRng::seed_from_u64(5);
        for _ in 0..20 {
            criteria.accept(&query(-50.0, 1.0), &mut rng);
        }
        // After repeated rejections the accumulated bias in bin 0 outweighs the penalty.
        let mut moved = false;
        for _ in 0..100 {
            if criteria.accept(&query(-50.0, 1.0), &mut rng) {
                moved = true;
                break;
            }
        }
        assert!(moved);
    }

    #[test]
    fn records_round_trip_both_variants() {
        let thermo = Thermo::new(0.4, vec![0.01, 0.02]).with_pressure(1e-3);
        let mut metropolis = Criteria::metropolis(thermo.clone());
        let mut wide = Criteria::multi_macrostate(thermo, MacrostateBias::new(-0.5, 4.5, 5, 1.0, 2.0));
        let mut rng = McRng::seed_from_u64(1);
        metropolis.accept(&query(-0.1, 1.0), &mut rng);
        wide.accept(&query(-0.1, 3.0), &mut rng);

        for criteria in [metropolis, wide] {
            let mut out = RecordWriter::new();
            criteria.write_records(&mut out);
            let records = Records::parse(out.as_str(), "memory").unwrap();
            assert_eq!(Criteria::from_records(&records).unwrap(), criteria);
        }
    }

    #[test]
    fn set_activity_grows_the_activity_list() {
        let mut criteria = Criteria::metropolis(Thermo::new(1.0, vec![]));
        criteria.set_activity(2, 0.5);
        assert_eq!(criteria.activity(2), Some(0.5));
        assert_eq!(criteria.activity(0), Some(0.0));
        assert_eq!(criteria.activity(3), None);
    }
}
