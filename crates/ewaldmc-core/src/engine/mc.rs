use super::accumulator::Accumulator;
use super::config::McConfig;
use super::criteria::Criteria;
use super::error::EngineError;
use super::log::LogWriter;
use super::progress::{Progress, ProgressReporter};
use super::rng::McRng;
use super::sampling::CumulativeTable;
use super::system::System;
use super::trials::{Trial, TrialKind, TrialOutcome};
use crate::core::forcefield::pair::{Pair, restore_pair};
use crate::core::io::record::{RecordWriter, Records};
use crate::core::io::traits::Restartable;
use crate::core::models::space::Space;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const CHECKPOINT_CLASS: &str = "MC";
const BACKUP_SUFFIX: &str = ".bak";

/// Weighted trial moves with their cumulative selection table.
#[derive(Debug, Clone, Default)]
pub struct TrialSet {
    trials: Vec<Trial>,
    weights: Vec<f64>,
    table: Option<CumulativeTable>,
}

impl TrialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn add(&mut self, trial: Trial, weight: f64) -> Result<(), EngineError> {
        self.trials.push(trial);
        self.weights.push(weight);
        if let Err(e) = self.rebuild() {
            self.trials.pop();
            self.weights.pop();
            self.rebuild()?;
            return Err(e);
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Trial, EngineError> {
        if index >= self.trials.len() {
            return Err(EngineError::TrialIndex {
                index,
                count: self.trials.len(),
            });
        }
        self.weights.remove(index);
        let trial = self.trials.remove(index);
        self.rebuild()?;
        Ok(trial)
    }

    /// Keeps only the trials for which `keep` returns true and returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Trial) -> bool) -> Result<usize, EngineError> {
        let before = self.trials.len();
        let mut weights = self.weights.iter();
        let mut kept_weights = Vec::with_capacity(before);
        self.trials.retain(|t| {
            let w = weights.next().copied().unwrap_or_default();
            let kept = keep(t);
            if kept {
                kept_weights.push(w);
            }
            kept
        });
        self.weights = kept_weights;
        self.rebuild()?;
        Ok(before - self.trials.len())
    }

    fn rebuild(&mut self) -> Result<(), EngineError> {
        self.table = if self.weights.is_empty() {
            None
        } else {
            Some(CumulativeTable::new(&self.weights)?)
        };
        Ok(())
    }

    /// Draws a trial with one uniform number and attempts it.
    fn attempt(&mut self, system: &mut System, rng: &mut McRng) -> Result<TrialOutcome, EngineError> {
        let table = self.table.as_ref().ok_or(EngineError::NoTrials)?;
        let index = table.select(rng.uniform());
        self.trials[index].attempt(system, rng)
    }

    fn tune(&mut self, space: &Space) {
        for trial in &mut self.trials {
            trial.tune_parameters(space);
        }
    }

    fn zero_stat(&mut self) {
        for trial in &mut self.trials {
            trial.zero_stat();
        }
    }

    fn log_header(&self) -> Vec<String> {
        let mut header = vec!["#attempts".to_string(), "pe/nMol".to_string()];
        for trial in &self.trials {
            header.extend(trial.stat_header());
        }
        header.push("configID".to_string());
        header
    }
}

#[inline]
fn due(n_attempts: u64, interval: u64) -> bool {
    interval > 0 && n_attempts % interval == 0
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    }
}

/// Copies an existing file to `<path>.bak`, then writes the new records.
fn write_with_backup(out: &RecordWriter, path: &Path) -> Result<(), EngineError> {
    if path.exists() {
        let backup = with_suffix(path, BACKUP_SUFFIX);
        std::fs::copy(path, &backup).map_err(|e| io_error(&backup, e))?;
    }
    Ok(out.write_to_path(path)?)
}

fn open_log<'a>(
    log: &'a mut Option<LogWriter>,
    path: Option<&Path>,
    header: impl FnOnce() -> Vec<String>,
) -> Result<Option<&'a mut LogWriter>, EngineError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if log.as_ref().is_none_or(|l| l.path() != path) {
        *log = Some(LogWriter::open(path, &header())?);
    }
    Ok(log.as_mut())
}

fn pe_per_mol(system: &System) -> f64 {
    match system.n_molecules() {
        0 => 0.0,
        n => system.energy() / n as f64,
    }
}

/// The Monte Carlo engine. Owns the system, the trials and the random stream.
#[derive(Debug)]
pub struct MonteCarlo {
    system: System,
    trials: TrialSet,
    rng: McRng,
    config: McConfig,
    n_attempts: u64,
    log: Option<LogWriter>,
    pe: Accumulator,
    n_mol: Accumulator,
    saved_criteria: Option<Criteria>,
    production: bool,
}

impl MonteCarlo {
    pub fn new(space: Space, pair: Box<dyn Pair>, criteria: Criteria, config: McConfig) -> Self {
        Self {
            system: System::new(space, pair, criteria),
            trials: TrialSet::new(),
            rng: McRng::seed_from_u64(config.seed),
            config,
            n_attempts: 0,
            log: None,
            pe: Accumulator::new(),
            n_mol: Accumulator::new(),
            saved_criteria: None,
            production: false,
        }
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Mutable access to the system. Changes that bypass the trials must be followed by
    /// [`MonteCarlo::init_energy`].
    pub fn system_mut(&mut self) -> &mut System {
        &mut self.system
    }

    pub fn space(&self) -> &Space {
        &self.system.space
    }

    pub fn pair(&self) -> &dyn Pair {
        self.system.pair.as_ref()
    }

    pub fn criteria(&self) -> &Criteria {
        &self.system.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut Criteria {
        &mut self.system.criteria
    }

    pub fn config(&self) -> &McConfig {
        &self.config
    }

    pub fn trials(&self) -> &[Trial] {
        self.trials.trials()
    }

    pub fn trial_set(&self) -> &TrialSet {
        &self.trials
    }

    pub fn n_attempts(&self) -> u64 {
        self.n_attempts
    }

    pub fn rng(&self) -> &McRng {
        &self.rng
    }

    pub fn pe_accumulator(&self) -> &Accumulator {
        &self.pe
    }

    pub fn n_mol_accumulator(&self) -> &Accumulator {
        &self.n_mol
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.config.log_path.as_deref()
    }

    pub fn init_energy(&mut self) -> Result<f64, EngineError> {
        self.system.init_energy()
    }

    pub fn pe_per_mol(&self) -> f64 {
        pe_per_mol(&self.system)
    }

    pub fn add_trial(&mut self, trial: Trial, weight: f64) -> Result<(), EngineError> {
        self.trials.add(trial, weight)
    }

    pub fn remove_trial(&mut self, index: usize) -> Result<Trial, EngineError> {
        self.trials.remove(index)
    }

    pub fn remove_last_trial(&mut self) -> Result<Trial, EngineError> {
        match self.trials.len() {
            0 => Err(EngineError::TrialIndex { index: 0, count: 0 }),
            n => self.trials.remove(n - 1),
        }
    }

    /// Removes every configurational-bias trial and returns how many were removed.
    pub fn remove_config_bias(&mut self) -> Result<usize, EngineError> {
        self.trials
            .retain(|t| !matches!(t.kind(), TrialKind::ConfigBias { .. }))
    }

    pub fn attempt_trial(&mut self) -> Result<TrialOutcome, EngineError> {
        if self.n_attempts == 0 {
            if self.trials.is_empty() {
                return Err(EngineError::NoTrials);
            }
            let energy = self.system.init_energy()?;
            info!(
                energy,
                n_molecules = self.system.n_molecules(),
                "Initialized energy before the first attempt."
            );
        }

        let outcome = self.trials.attempt(&mut self.system, &mut self.rng)?;
        self.pe.accumulate(self.system.energy());
        self.n_mol.accumulate(self.system.n_molecules() as f64);
        self.n_attempts += 1;

        self.after_attempt()?;
        Ok(outcome)
    }

    fn after_attempt(&mut self) -> Result<(), EngineError> {
        let n = self.n_attempts;
        if due(n, self.config.checkpoint_interval) {
            if let Some(path) = self.config.checkpoint_path.clone() {
                self.write_checkpoint(&path)?;
            }
        }
        if due(n, self.config.check_interval) {
            let full = self
                .system
                .pair
                .check_energy(&self.system.space, self.config.check_tolerance)?;
            debug!(attempt = n, energy = full, "Energy consistency check passed.");
        }
        if due(n, self.config.log_interval) {
            self.write_log_row()?;
        }
        if due(n, self.config.tune_interval) {
            self.trials.tune(&self.system.space);
        }
        Ok(())
    }

    fn write_log_row(&mut self) -> Result<(), EngineError> {
        let trials = &self.trials;
        let Some(log) = open_log(&mut self.log, self.config.log_path.as_deref(), || {
            trials.log_header()
        })?
        else {
            return Ok(());
        };
        let mut row = vec![
            self.n_attempts.to_string(),
            pe_per_mol(&self.system).to_string(),
        ];
        for trial in self.trials.trials() {
            row.extend(trial.stat_values());
        }
        row.push(self.system.space.config_id().to_string());
        log.write_row(&row)
    }

    /// Appends a `#` comment line to the log, if one is configured.
    pub fn log_comment(&mut self, text: &str) -> Result<(), EngineError> {
        let trials = &self.trials;
        if let Some(log) = open_log(&mut self.log, self.config.log_path.as_deref(), || {
            trials.log_header()
        })? {
            log.comment(text)?;
        }
        Ok(())
    }

    pub fn run(&mut self, n_attempts: u64) -> Result<(), EngineError> {
        for _ in 0..n_attempts {
            self.attempt_trial()?;
        }
        Ok(())
    }

    #[instrument(skip_all, name = "mc_run", fields(n_attempts))]
    pub fn run_with_progress(
        &mut self,
        n_attempts: u64,
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        reporter.report(Progress::PhaseStart {
            name: "Monte Carlo",
        });
        reporter.report(Progress::TaskStart {
            total_steps: n_attempts,
        });
        let chunk = (n_attempts / 100).max(1);
        let mut pending = 0;
        for _ in 0..n_attempts {
            self.attempt_trial()?;
            pending += 1;
            if pending == chunk {
                reporter.report(Progress::TaskAdvance { steps: pending });
                pending = 0;
            }
        }
        if pending > 0 {
            reporter.report(Progress::TaskAdvance { steps: pending });
        }
        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);
        info!(
            attempts = self.n_attempts,
            pe_per_mol = self.pe_per_mol(),
            n_molecules = self.system.n_molecules(),
            "Run finished."
        );
        Ok(())
    }

    /// Resets criteria, trial statistics, accumulators and the attempt counter.
    pub fn zero_stat(&mut self) {
        self.system.criteria.zero_stat();
        self.trials.zero_stat();
        self.pe.reset();
        self.n_mol.reset();
        self.n_attempts = 0;
    }

    /// Installs `criteria`, keeping the current one for [`MonteCarlo::restore_criteria`].
    pub fn replace_criteria(&mut self, criteria: Criteria) -> Result<(), EngineError> {
        if self.saved_criteria.is_some() {
            return Err(EngineError::CriteriaAlreadySaved);
        }
        self.saved_criteria = Some(std::mem::replace(&mut self.system.criteria, criteria));
        Ok(())
    }

    /// Reinstalls the saved criteria and returns the one it replaces.
    pub fn restore_criteria(&mut self) -> Result<Criteria, EngineError> {
        let saved = self
            .saved_criteria
            .take()
            .ok_or(EngineError::NoSavedCriteria)?;
        Ok(std::mem::replace(&mut self.system.criteria, saved))
    }

    /// Switches to production: later log output goes to the log name with the production suffix.
    pub fn init_production(&mut self) {
        self.production = true;
        if let Some(path) = &self.config.log_path {
            let path = with_suffix(path, &self.config.production_suffix);
            info!(log = %path.display(), "Production phase started.");
            self.config.log_path = Some(path);
        }
        self.log = None;
    }

    /// Runs `n_attempts` at a large `activity` for `kind` to estimate the largest molecule
    /// count worth sampling. Statistics are zeroed and the activity restored afterwards.
    #[instrument(skip(self), name = "max_molecules")]
    pub fn max_molecules(
        &mut self,
        n_attempts: u64,
        kind: usize,
        activity: f64,
        extra: usize,
    ) -> Result<usize, EngineError> {
        let original = self
            .system
            .criteria
            .activity(kind)
            .ok_or(EngineError::MissingActivity { kind })?;
        self.system.criteria.set_activity(kind, activity);
        let result = self.run(n_attempts);
        self.system.criteria.set_activity(kind, original);
        result?;
        self.zero_stat();

        let max = self.system.n_molecules() + extra;
        self.log_comment(&format!("MonteCarlo found maximum number of mols: {}", max))?;
        info!(max, "Estimated maximum number of molecules.");
        Ok(max)
    }

    /// A non-owning handle with its own copy of the trial set. The engine is unusable until
    /// the handle is dropped.
    pub fn shallow(&mut self) -> ShallowMc<'_> {
        let log_header = self.trials.log_header();
        ShallowMc {
            system: &mut self.system,
            rng: &mut self.rng,
            log: &mut self.log,
            log_path: self.config.log_path.clone(),
            log_header,
            trials: self.trials.clone(),
            check_interval: self.config.check_interval,
            check_tolerance: self.config.check_tolerance,
            n_attempts: 0,
        }
    }

    /// Writes the main checkpoint file plus its `space`, `pair`, `criteria` and `trial<i>`
    /// sub-files next to it. Existing files are backed up to `<file>.bak` first.
    pub fn write_checkpoint(&self, path: &Path) -> Result<(), EngineError> {
        let file_name = |suffix: &str| -> String {
            with_suffix(path, suffix)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| suffix.to_string())
        };
        let mut main = RecordWriter::new();
        main.class(CHECKPOINT_CLASS);

        let space_file = file_name("space");
        write_with_backup(&self.system.space.to_records(), &with_suffix(path, "space"))?;
        main.record("rstFileSpace", &space_file);

        let mut pair = RecordWriter::new();
        self.system.pair.write_records(&mut pair);
        write_with_backup(&pair, &with_suffix(path, "pair"))?;
        main.record("rstFilePair", file_name("pair"));

        let mut criteria = RecordWriter::new();
        self.system.criteria.write_records(&mut criteria);
        write_with_backup(&criteria, &with_suffix(path, "criteria"))?;
        main.record("rstFileCriteria", file_name("criteria"));

        if let Some(saved) = &self.saved_criteria {
            let mut out = RecordWriter::new();
            saved.write_records(&mut out);
            write_with_backup(&out, &with_suffix(path, "criteriaSaved"))?;
            main.record("rstFileSavedCriteria", file_name("criteriaSaved"));
        }

        main.record("nTrials", self.trials.len());
        for (i, (trial, weight)) in self
            .trials
            .trials()
            .iter()
            .zip(self.trials.weights())
            .enumerate()
        {
            let suffix = format!("trial{}", i);
            let mut out = RecordWriter::new();
            trial.write_records(&mut out);
            write_with_backup(&out, &with_suffix(path, &suffix))?;
            main.record(&format!("rstFileTrial{}", i), file_name(&suffix));
            main.record(&format!("trialWeight{}", i), weight);
        }

        main.record("nAttempts", self.n_attempts);
        main.record("production", self.production);
        self.config.write_records(&mut main);
        self.pe.write_records("peAccumulator", &mut main);
        self.n_mol.write_records("nMolAccumulator", &mut main);
        self.rng.write_records(&mut main);

        write_with_backup(&main, path)?;
        info!(path = %path.display(), attempts = self.n_attempts, "Wrote checkpoint.");
        Ok(())
    }

    /// Restores an engine from a checkpoint written by [`MonteCarlo::write_checkpoint`].
    ///
    /// Later checkpoints are written back to the same path.
    #[instrument(name = "mc_resume")]
    pub fn resume(path: &Path) -> Result<Self, EngineError> {
        let records = Records::read(path)?;
        records.expect_class(CHECKPOINT_CLASS)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let sub_file = |key: &str| -> Result<PathBuf, EngineError> {
            let name: String = records.required(key)?;
            Ok(dir.join(name))
        };

        let space = Space::read_from_path(sub_file("rstFileSpace")?)?;
        let pair = restore_pair(&Records::read(&sub_file("rstFilePair")?)?, &space)?;
        let criteria = Criteria::read_from_path(&sub_file("rstFileCriteria")?)?;
        let saved_criteria = match records.optional::<String>("rstFileSavedCriteria")? {
            Some(name) => Some(Criteria::read_from_path(&dir.join(name))?),
            None => None,
        };

        let mut trials = TrialSet::new();
        let n_trials: usize = records.required("nTrials")?;
        for i in 0..n_trials {
            let trial = Trial::read_from_path(&sub_file(&format!("rstFileTrial{}", i))?)?;
            let weight: f64 = records.required(&format!("trialWeight{}", i))?;
            trials.add(trial, weight)?;
        }

        let mut config = McConfig::from_records(&records)?;
        config.checkpoint_path = Some(path.to_path_buf());

        let mc = Self {
            system: System::new(space, pair, criteria),
            trials,
            rng: McRng::from_records(&records)?,
            config,
            n_attempts: records.required("nAttempts")?,
            log: None,
            pe: Accumulator::from_records("peAccumulator", &records)?,
            n_mol: Accumulator::from_records("nMolAccumulator", &records)?,
            saved_criteria,
            production: records.or_default("production", false)?,
        };
        info!(
            attempts = mc.n_attempts,
            n_molecules = mc.system.n_molecules(),
            energy = mc.system.energy(),
            "Resumed from checkpoint."
        );
        Ok(mc)
    }
}

/// A non-owning view of a [`MonteCarlo`] used by biased sub-procedures.
///
/// It shares the owner's system, random stream and log but attempts from its own trial set
/// and keeps its own attempt counter. Only the energy consistency check runs as
/// housekeeping; nothing is checkpointed or logged per attempt.
pub struct ShallowMc<'a> {
    system: &'a mut System,
    rng: &'a mut McRng,
    log: &'a mut Option<LogWriter>,
    log_path: Option<PathBuf>,
    log_header: Vec<String>,
    trials: TrialSet,
    check_interval: u64,
    check_tolerance: f64,
    n_attempts: u64,
}

impl<'a> ShallowMc<'a> {
    pub fn system(&self) -> &System {
        self.system
    }

    pub fn system_mut(&mut self) -> &mut System {
        self.system
    }

    pub fn trials(&self) -> &[Trial] {
        self.trials.trials()
    }

    pub fn total_weight(&self) -> f64 {
        self.trials.total_weight()
    }

    pub fn n_attempts(&self) -> u64 {
        self.n_attempts
    }

    pub fn add_trial(&mut self, trial: Trial, weight: f64) -> Result<(), EngineError> {
        self.trials.add(trial, weight)
    }

    pub fn retain_trials(&mut self, keep: impl FnMut(&Trial) -> bool) -> Result<usize, EngineError> {
        self.trials.retain(keep)
    }

    pub fn attempt_trial(&mut self) -> Result<TrialOutcome, EngineError> {
        if self.n_attempts == 0 {
            if self.trials.is_empty() {
                return Err(EngineError::NoTrials);
            }
            self.system.init_energy()?;
        }
        let outcome = self.trials.attempt(self.system, self.rng)?;
        self.n_attempts += 1;
        if due(self.n_attempts, self.check_interval) {
            self.system
                .pair
                .check_energy(&self.system.space, self.check_tolerance)?;
        }
        Ok(outcome)
    }

    pub fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        let header = &self.log_header;
        if let Some(log) = open_log(self.log, self.log_path.as_deref(), || header.clone())? {
            log.comment(text)?;
        }
        Ok(())
    }
}
