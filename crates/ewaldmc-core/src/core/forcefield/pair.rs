use super::ewald::ReciprocalCache;
use super::params::{MixingTable, PairParams};
use super::potentials::{ErfcTable, gaussian_overlap, lennard_jones, lennard_jones_tail};
use super::term::EnergyTerms;
use crate::core::io::record::{RecordError, RecordWriter, Records};
use crate::core::models::space::{DeleteMode, Removal, Space};
use nalgebra::Vector3;
use num_complex::Complex64;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PairError {
    #[error("Size mismatch in {context}: expected {expected}, found {found}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(
        "Incremental energy {incremental} differs from full recomputation {full} by more than {tolerance}"
    )]
    EnergyDrift {
        incremental: f64,
        full: f64,
        tolerance: f64,
    },
    #[error("Commit requested without a pending proposal")]
    NothingToCommit,
    #[error("Site index {index} out of range ({n_sites} sites)")]
    SubsetOutOfRange { index: usize, n_sites: usize },
    #[error("Site type {site_type} has no parameters ({n_types} types defined)")]
    UnknownSiteType { site_type: usize, n_types: usize },
    #[error("Unknown pair class '{0}'")]
    UnknownClass(String),
    #[error("Pair restart error: {source}")]
    Record {
        #[from]
        source: RecordError,
    },
}

/// The operation a proposal is evaluated for.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Return the already-known total energy.
    NoOp,
    /// The subset has been appended to the space; return the energy it adds.
    Insert,
    /// Return the energy that deleting the subset would remove.
    Delete,
    /// The subset has moved in the space; `previous` holds its old positions in subset order.
    Move { previous: &'a [Vector3<f64>] },
    /// Recompute everything, e.g. after the box changed; return the new total.
    Rebuild,
}

/// An interaction potential with a two-phase propose/commit protocol.
///
/// [`Pair::propose`] never touches the committed energy. On acceptance the caller commits;
/// on rejection the shadow state is simply overwritten by the next proposal.
pub trait Pair: fmt::Debug + Send {
    fn class_name(&self) -> &'static str;

    /// Recomputes the committed state from scratch and returns the total energy.
    fn init_energy(&mut self, space: &Space) -> Result<f64, PairError>;

    fn propose(
        &mut self,
        space: &Space,
        op: Operation<'_>,
        subset: &[usize],
    ) -> Result<f64, PairError>;

    fn commit(&mut self) -> Result<(), PairError>;

    fn discard(&mut self);

    /// Shrinks per-site caches after sites were removed from the space.
    fn apply_removal(&mut self, removal: &Removal) -> Result<(), PairError>;

    fn total(&self) -> f64;

    fn terms(&self) -> EnergyTerms;

    /// Computes the energy decomposition from scratch without modifying any state.
    fn full_terms(&self, space: &Space) -> Result<EnergyTerms, PairError>;

    /// The removal mode callers should use when deleting molecules.
    fn delete_mode(&self) -> DeleteMode {
        DeleteMode::Stable
    }

    fn clone_box(&self) -> Box<dyn Pair>;

    fn write_records(&self, out: &mut RecordWriter);

    /// Compares the committed total against a full recomputation.
    fn check_energy(&self, space: &Space, tolerance: f64) -> Result<f64, PairError> {
        let full = self.full_terms(space)?.total();
        let incremental = self.total();
        if (full - incremental).abs() > tolerance {
            return Err(PairError::EnergyDrift {
                incremental,
                full,
                tolerance,
            });
        }
        Ok(full)
    }

    /// Clones the potential and initializes it on another configuration.
    fn clone_onto(&self, space: &Space) -> Result<Box<dyn Pair>, PairError> {
        let mut pair = self.clone_box();
        pair.init_energy(space)?;
        Ok(pair)
    }
}

impl Clone for Box<dyn Pair> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Reconstructs a pair from its restart records by class tag.
pub fn restore_pair(records: &Records, space: &Space) -> Result<Box<dyn Pair>, PairError> {
    match records.class()? {
        LjCoulEwald::CLASS => Ok(Box::new(LjCoulEwald::from_records(records, space)?)),
        other => Err(PairError::UnknownClass(other.to_string())),
    }
}

#[derive(Debug, Clone)]
enum Pending {
    Partial {
        delta: EnergyTerms,
        structure: Vec<Complex64>,
        rows: Vec<(usize, Vec<Complex64>)>,
        counts: Option<Vec<usize>>,
    },
    Full {
        terms: EnergyTerms,
        cache: ReciprocalCache,
        counts: Vec<usize>,
    },
}

/// Lennard-Jones plus Ewald-summed Coulomb interactions between sites of different molecules.
#[derive(Debug, Clone)]
pub struct LjCoulEwald {
    params: PairParams,
    mixing: MixingTable,
    alpha: f64,
    erfc: ErfcTable,
    terms: EnergyTerms,
    type_counts: Vec<usize>,
    cache: ReciprocalCache,
    pending: Option<Pending>,
}

impl LjCoulEwald {
    pub const CLASS: &'static str = "LjCoulEwald";

    /// Creates the potential with α = alpha_l / shortest box length and initializes the energy.
    pub fn new(params: PairParams, space: &Space) -> Result<Self, PairError> {
        let alpha = params.globals.alpha_l / space.min_length();
        let mut pair = Self::with_alpha(params, alpha, space)?;
        pair.init_energy(space)?;
        Ok(pair)
    }

    fn with_alpha(params: PairParams, alpha: f64, space: &Space) -> Result<Self, PairError> {
        let mixing = MixingTable::new(&params);
        if space.n_site_types() > mixing.n_types() {
            return Err(PairError::UnknownSiteType {
                site_type: space.n_site_types() - 1,
                n_types: mixing.n_types(),
            });
        }
        if 2.0 * params.globals.cutoff > space.min_length() {
            warn!(
                cutoff = params.globals.cutoff,
                min_length = space.min_length(),
                "Cutoff exceeds half the shortest box length."
            );
        }
        let erfc = ErfcTable::new(
            alpha,
            params.globals.cutoff,
            params.globals.erfc_table_points,
        );
        let cache = ReciprocalCache::empty(space.box_lengths(), alpha, params.globals.k2max);
        Ok(Self {
            type_counts: vec![0; mixing.n_types()],
            params,
            mixing,
            alpha,
            erfc,
            terms: EnergyTerms::default(),
            cache,
            pending: None,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn params(&self) -> &PairParams {
        &self.params
    }

    pub fn reciprocal(&self) -> &ReciprocalCache {
        &self.cache
    }

    fn charge_of(&self, space: &Space, site: usize) -> f64 {
        self.mixing.charge(space.site_types()[site])
    }

    fn build_cache(&self, space: &Space) -> ReciprocalCache {
        ReciprocalCache::build(
            space.box_lengths(),
            self.alpha,
            self.params.globals.k2max,
            space.positions(),
            space.site_types().iter().map(|&t| self.mixing.charge(t)),
        )
    }

    fn count_types(&self, space: &Space) -> Vec<usize> {
        let mut counts = vec![0; self.mixing.n_types()];
        for &t in space.site_types() {
            counts[t] += 1;
        }
        counts
    }

    fn tail(&self, counts: &[usize], volume: f64) -> f64 {
        if !self.params.globals.tail_correction {
            return 0.0;
        }
        let cutoff = self.params.globals.cutoff;
        let mut sum = 0.0;
        for (a, &na) in counts.iter().enumerate() {
            for (b, &nb) in counts.iter().enumerate() {
                let eps = self.mixing.epsilon(a, b);
                if eps == 0.0 || na == 0 || nb == 0 {
                    continue;
                }
                sum += lennard_jones_tail(
                    na as f64,
                    nb as f64,
                    volume,
                    eps,
                    self.mixing.sigma(a, b),
                    cutoff,
                );
            }
        }
        sum
    }

    #[inline]
    fn site_site(&self, ti: usize, tj: usize, r2: f64) -> (f64, f64) {
        let cutoff = self.params.globals.cutoff;
        if r2 >= cutoff * cutoff {
            return (0.0, 0.0);
        }
        let eps = self.mixing.epsilon(ti, tj);
        let lj = if eps != 0.0 {
            lennard_jones(r2, eps, self.mixing.sigma(ti, tj))
        } else {
            0.0
        };
        let qq = self.mixing.charge(ti) * self.mixing.charge(tj);
        let q_real = if qq != 0.0 { qq * self.erfc.eval(r2) } else { 0.0 };
        (lj, q_real)
    }

    fn compute_full(&self, space: &Space) -> (EnergyTerms, ReciprocalCache, Vec<usize>) {
        let positions = space.positions();
        let types = space.site_types();
        let molecule = space.site_molecule();
        let n = positions.len();

        let mut lj = 0.0;
        let mut q_real = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                if molecule[i] == molecule[j] {
                    continue;
                }
                let r2 = space.minimum_image(positions[i] - positions[j]).norm_squared();
                let (a, b) = self.site_site(types[i], types[j], r2);
                lj += a;
                q_real += b;
            }
        }

        let mut q_self = 0.0;
        for i in 0..n {
            let qi = self.mixing.charge(types[i]);
            q_self += self.alpha * qi * qi / PI.sqrt();
            for j in space.molecules()[molecule[i]].sites() {
                if j > i {
                    let qj = self.mixing.charge(types[j]);
                    let r = (positions[i] - positions[j]).norm();
                    q_self += qi * qj * gaussian_overlap(r, self.alpha);
                }
            }
        }

        let cache = self.build_cache(space);
        let counts = self.count_types(space);
        let terms = EnergyTerms {
            lj,
            lrc: self.tail(&counts, space.volume()),
            q_real,
            q_fourier: cache.energy(),
            q_self,
        };
        (terms, cache, counts)
    }

    fn validate_subset(&self, space: &Space, subset: &[usize]) -> Result<(), PairError> {
        let n_sites = space.n_sites();
        match subset.iter().find(|&&i| i >= n_sites) {
            Some(&index) => Err(PairError::SubsetOutOfRange { index, n_sites }),
            None => Ok(()),
        }
    }

    /// Real-space LJ and Coulomb energy of the subset with everything else, plus pairs
    /// inside the subset, optionally with the subset at `previous` positions.
    fn subset_real(
        &self,
        space: &Space,
        subset: &[usize],
        previous: Option<&[Vector3<f64>]>,
    ) -> (f64, f64) {
        let positions = space.positions();
        let types = space.site_types();
        let molecule = space.site_molecule();

        let mut slot = vec![usize::MAX; positions.len()];
        for (a, &i) in subset.iter().enumerate() {
            slot[i] = a;
        }
        let at = |i: usize| match (previous, slot[i]) {
            (Some(prev), a) if a != usize::MAX => prev[a],
            _ => positions[i],
        };

        let mut lj = 0.0;
        let mut q_real = 0.0;
        for (a, &i) in subset.iter().enumerate() {
            let ri = at(i);
            for j in 0..positions.len() {
                if molecule[j] == molecule[i] || (slot[j] != usize::MAX && slot[j] <= a) {
                    continue;
                }
                let r2 = space.minimum_image(ri - at(j)).norm_squared();
                let (e_lj, e_q) = self.site_site(types[i], types[j], r2);
                lj += e_lj;
                q_real += e_q;
            }
        }
        (lj, q_real)
    }

    /// Self and intramolecular corrections involving at least one subset site.
    fn subset_self(
        &self,
        space: &Space,
        subset: &[usize],
        previous: Option<&[Vector3<f64>]>,
    ) -> f64 {
        let positions = space.positions();
        let molecule = space.site_molecule();
        let position_of = |i: usize| match previous {
            Some(prev) => subset
                .iter()
                .position(|&s| s == i)
                .map_or(positions[i], |a| prev[a]),
            None => positions[i],
        };

        let mut q_self = 0.0;
        for (a, &i) in subset.iter().enumerate() {
            let qi = self.charge_of(space, i);
            q_self += self.alpha * qi * qi / PI.sqrt();
            let ri = position_of(i);
            for j in space.molecules()[molecule[i]].sites() {
                if j == i {
                    continue;
                }
                if let Some(b) = subset.iter().position(|&s| s == j) {
                    if b <= a {
                        continue;
                    }
                }
                let qj = self.charge_of(space, j);
                let r = (ri - position_of(j)).norm();
                q_self += qi * qj * gaussian_overlap(r, self.alpha);
            }
        }
        q_self
    }

    fn counts_after(&self, space: &Space, subset: &[usize], insert: bool) -> Vec<usize> {
        let mut counts = self.type_counts.clone();
        for &i in subset {
            let t = space.site_types()[i];
            if insert {
                counts[t] += 1;
            } else {
                counts[t] = counts[t].saturating_sub(1);
            }
        }
        counts
    }

    fn propose_insert(&mut self, space: &Space, subset: &[usize]) -> Result<f64, PairError> {
        let existing = self.cache.phases().len();
        if existing + subset.len() != space.n_sites()
            || subset.iter().enumerate().any(|(a, &i)| i != existing + a)
        {
            return Err(PairError::SizeMismatch {
                context: "inserted sites must be the trailing sites of the space",
                expected: space.n_sites(),
                found: existing + subset.len(),
            });
        }

        // The committed phase table only grows in commit.
        let mut structure = self.cache.structure().to_vec();
        let mut rows = Vec::with_capacity(subset.len());
        for &i in subset {
            let mut row = vec![Complex64::new(0.0, 0.0); self.cache.row_len()];
            self.cache.compute_row(&space.positions()[i], &mut row);
            self.cache
                .accumulate(&mut structure, &row, self.charge_of(space, i));
            rows.push((i, row));
        }

        let (lj, q_real) = self.subset_real(space, subset, None);
        let counts = self.counts_after(space, subset, true);
        let delta = EnergyTerms {
            lj,
            lrc: self.tail(&counts, space.volume()) - self.terms.lrc,
            q_real,
            q_fourier: self.cache.energy_of(&structure) - self.terms.q_fourier,
            q_self: self.subset_self(space, subset, None),
        };
        self.pending = Some(Pending::Partial {
            delta,
            structure,
            rows,
            counts: Some(counts),
        });
        Ok(delta.total())
    }

    fn propose_delete(&mut self, space: &Space, subset: &[usize]) -> Result<f64, PairError> {
        self.ensure_rows(space)?;
        let mut structure = self.cache.structure().to_vec();
        for &i in subset {
            self.cache.accumulate(
                &mut structure,
                self.cache.phases().row(i),
                -self.charge_of(space, i),
            );
        }

        let (lj, q_real) = self.subset_real(space, subset, None);
        let counts = self.counts_after(space, subset, false);
        let delta = EnergyTerms {
            lj: -lj,
            lrc: self.tail(&counts, space.volume()) - self.terms.lrc,
            q_real: -q_real,
            q_fourier: self.cache.energy_of(&structure) - self.terms.q_fourier,
            q_self: -self.subset_self(space, subset, None),
        };
        self.pending = Some(Pending::Partial {
            delta,
            structure,
            rows: Vec::new(),
            counts: Some(counts),
        });
        Ok(-delta.total())
    }

    fn propose_move(
        &mut self,
        space: &Space,
        subset: &[usize],
        previous: &[Vector3<f64>],
    ) -> Result<f64, PairError> {
        self.ensure_rows(space)?;
        if previous.len() != subset.len() {
            return Err(PairError::SizeMismatch {
                context: "previous positions of moved sites",
                expected: subset.len(),
                found: previous.len(),
            });
        }

        let mut structure = self.cache.structure().to_vec();
        let mut rows = Vec::with_capacity(subset.len());
        for &i in subset {
            let q = self.charge_of(space, i);
            let mut row = vec![Complex64::new(0.0, 0.0); self.cache.row_len()];
            self.cache.compute_row(&space.positions()[i], &mut row);
            self.cache.accumulate(&mut structure, self.cache.phases().row(i), -q);
            self.cache.accumulate(&mut structure, &row, q);
            rows.push((i, row));
        }

        let (lj_new, q_real_new) = self.subset_real(space, subset, None);
        let (lj_old, q_real_old) = self.subset_real(space, subset, Some(previous));
        let delta = EnergyTerms {
            lj: lj_new - lj_old,
            lrc: 0.0,
            q_real: q_real_new - q_real_old,
            q_fourier: self.cache.energy_of(&structure) - self.terms.q_fourier,
            q_self: self.subset_self(space, subset, None)
                - self.subset_self(space, subset, Some(previous)),
        };
        self.pending = Some(Pending::Partial {
            delta,
            structure,
            rows,
            counts: None,
        });
        Ok(delta.total())
    }

    fn ensure_rows(&self, space: &Space) -> Result<(), PairError> {
        if self.cache.phases().len() != space.n_sites() {
            return Err(PairError::SizeMismatch {
                context: "per-site phase rows",
                expected: space.n_sites(),
                found: self.cache.phases().len(),
            });
        }
        Ok(())
    }

    fn check_sizes(&self, space: &Space) -> Result<(), PairError> {
        if self.cache.structure().len() != self.cache.n_wavevectors() {
            return Err(PairError::SizeMismatch {
                context: "structure factors vs wavevector weights",
                expected: self.cache.n_wavevectors(),
                found: self.cache.structure().len(),
            });
        }
        self.ensure_rows(space)
    }

    pub fn from_records(records: &Records, space: &Space) -> Result<Self, PairError> {
        records.expect_class(Self::CLASS)?;
        let params = PairParams::from_records(records)?;
        let alpha: f64 = records.required("alpha")?;
        let mut pair = Self::with_alpha(params, alpha, space)?;
        pair.init_energy(space)?;

        let terms: Vec<f64> = records.list("terms")?;
        let terms: [f64; 5] = terms
            .try_into()
            .map_err(|v: Vec<f64>| records.invalid("terms", format!("{:?}", v)))?;
        pair.terms = EnergyTerms::from_array(terms);

        let n_k: usize = records.required("nWavevectors")?;
        if n_k != pair.cache.n_wavevectors() || records.body().len() != n_k {
            return Err(PairError::SizeMismatch {
                context: "restored structure factors vs wavevector weights",
                expected: pair.cache.n_wavevectors(),
                found: records.body().len(),
            });
        }
        let mut structure = Vec::with_capacity(n_k);
        for line in records.body() {
            let mut fields = line.split_whitespace().map(str::parse::<f64>);
            match (fields.next(), fields.next()) {
                (Some(Ok(re)), Some(Ok(im))) => structure.push(Complex64::new(re, im)),
                _ => return Err(records.invalid("structureFactor", line.clone()).into()),
            }
        }
        pair.cache.set_structure(structure);
        Ok(pair)
    }
}

impl Pair for LjCoulEwald {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn init_energy(&mut self, space: &Space) -> Result<f64, PairError> {
        let (terms, cache, counts) = self.compute_full(space);
        self.terms = terms;
        self.cache = cache;
        self.type_counts = counts;
        self.pending = None;
        self.check_sizes(space)?;
        debug!(
            total = terms.total(),
            n_wavevectors = self.cache.n_wavevectors(),
            "Initialized pair energy."
        );
        Ok(terms.total())
    }

    fn propose(
        &mut self,
        space: &Space,
        op: Operation<'_>,
        subset: &[usize],
    ) -> Result<f64, PairError> {
        self.validate_subset(space, subset)?;
        match op {
            Operation::NoOp => {
                self.pending = None;
                Ok(self.total())
            }
            Operation::Insert => self.propose_insert(space, subset),
            Operation::Delete => self.propose_delete(space, subset),
            Operation::Move { previous } => self.propose_move(space, subset, previous),
            Operation::Rebuild => {
                let (terms, cache, counts) = self.compute_full(space);
                self.pending = Some(Pending::Full {
                    terms,
                    cache,
                    counts,
                });
                Ok(terms.total())
            }
        }
    }

    fn commit(&mut self) -> Result<(), PairError> {
        match self.pending.take() {
            None => Err(PairError::NothingToCommit),
            Some(Pending::Partial {
                delta,
                structure,
                rows,
                counts,
            }) => {
                self.terms += delta;
                // The Fourier term is re-derived from the committed structure factors.
                self.terms.q_fourier = self.cache.energy_of(&structure);
                self.cache.set_structure(structure);
                let phases = self.cache.phases_mut();
                for (site, row) in rows {
                    if site == phases.len() {
                        phases.push_row(&row);
                    } else {
                        phases.row_mut(site).copy_from_slice(&row);
                    }
                }
                if let Some(counts) = counts {
                    self.type_counts = counts;
                }
                Ok(())
            }
            Some(Pending::Full {
                terms,
                cache,
                counts,
            }) => {
                self.terms = terms;
                self.cache = cache;
                self.type_counts = counts;
                Ok(())
            }
        }
    }

    fn discard(&mut self) {
        self.pending = None;
    }

    fn apply_removal(&mut self, removal: &Removal) -> Result<(), PairError> {
        let n = self.cache.phases().len();
        if removal.first + removal.len > n {
            return Err(PairError::SizeMismatch {
                context: "removed sites vs phase rows",
                expected: removal.first + removal.len,
                found: n,
            });
        }
        self.cache.phases_mut().apply(removal);
        Ok(())
    }

    fn total(&self) -> f64 {
        self.terms.total()
    }

    fn terms(&self) -> EnergyTerms {
        self.terms
    }

    fn full_terms(&self, space: &Space) -> Result<EnergyTerms, PairError> {
        self.check_sizes(space)?;
        Ok(self.compute_full(space).0)
    }

    fn delete_mode(&self) -> DeleteMode {
        if self.params.globals.fast_delete {
            DeleteMode::SwapLast
        } else {
            DeleteMode::Stable
        }
    }

    fn clone_box(&self) -> Box<dyn Pair> {
        Box::new(self.clone())
    }

    fn write_records(&self, out: &mut RecordWriter) {
        out.class(Self::CLASS);
        self.params.write_records(out);
        out.record("alpha", self.alpha);
        out.list("terms", &self.terms.to_array());
        out.record("nWavevectors", self.cache.n_wavevectors());
        for s in self.cache.structure() {
            out.line(format!("{} {}", s.re, s.im));
        }
    }
}
