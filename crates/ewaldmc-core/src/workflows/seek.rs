use crate::engine::config::ConfigError;
use crate::engine::criteria::{Criteria, MacrostateBias, Thermo};
use crate::engine::error::EngineError;
use crate::engine::mc::{MonteCarlo, ShallowMc};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::trials::{Trial, TrialKind};
use tracing::{info, instrument};

/// Pressure applied while squeezing an expanded box back to its original volume.
const SQUEEZE_PRESSURE: f64 = 1e7;
/// Maximum `ln V` step of the squeezing volume trial.
const SQUEEZE_MAX_LN_VOLUME: f64 = 0.01;
/// Progress is reported each time another quarter of the change is completed.
const PROGRESS_STEP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekReport {
    /// Attempts spent, including any compression attempts.
    pub attempts: u64,
    pub n_molecules: usize,
    /// Whether the box was expanded and squeezed back.
    pub compressed: bool,
}

/// Acceptance with a quarter of the inverse temperature over every macrostate between zero
/// and `n_max`.
fn wide_criteria(current: &Criteria, n_now: usize, n_max: usize, squeeze: bool) -> Criteria {
    let original = current.thermo();
    let mut thermo = Thermo::new(original.beta / 4.0, original.activities.clone());
    thermo.pressure = if squeeze {
        Some(SQUEEZE_PRESSURE)
    } else {
        original.pressure
    };
    let bias = MacrostateBias::new(-0.5, n_max as f64 + 0.5, n_max + 1, 0.0, n_now as f64);
    Criteria::multi_macrostate(thermo, bias)
}

/// Drives the molecule count of `kind` molecules to `target` by biased insertion or deletion.
///
/// The engine runs with wide, cooler criteria and a trial set that only works towards the
/// target. Detailed balance does not hold while seeking, so statistics gathered here are
/// meaningless. When growing under a pressure the box is first expanded by `volume_expansion`
/// and squeezed back to its original volume afterwards, sharing the same attempt budget.
///
/// The original criteria are restored whether or not the seek succeeds. The engine's own
/// trial set is never modified.
///
/// # Errors
///
/// Returns [`EngineError::Config`] if `volume_expansion` is not a positive factor,
/// [`EngineError::SeekFailed`] if the target is not reached within `max_attempts`,
/// and [`EngineError::CompressionFailed`] if the box cannot be squeezed back in time.
#[instrument(skip(mc, reporter), name = "seek_molecules")]
pub fn seek_molecules(
    mc: &mut MonteCarlo,
    target: usize,
    kind: usize,
    max_attempts: u64,
    volume_expansion: f64,
    reporter: &ProgressReporter,
) -> Result<SeekReport, EngineError> {
    if !(volume_expansion.is_finite() && volume_expansion > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "volume_expansion",
            reason: format!("must be a positive factor, got {}", volume_expansion),
        }
        .into());
    }
    let start = mc.system().n_molecules();
    if start == target {
        return Ok(SeekReport {
            attempts: 0,
            n_molecules: start,
            compressed: false,
        });
    }
    let growing = target > start;
    let squeeze = growing && mc.criteria().pressure().is_some();
    info!(start, target, squeeze, "Seeking molecule count.");

    let wide = wide_criteria(mc.criteria(), start, start.max(target), squeeze);
    mc.replace_criteria(wide)?;
    let result = seek_with_wide_criteria(mc, start, target, kind, max_attempts, volume_expansion, squeeze, reporter);
    mc.restore_criteria()?;

    let report = result?;
    info!(
        attempts = report.attempts,
        n_molecules = report.n_molecules,
        "Seek finished."
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn seek_with_wide_criteria(
    mc: &mut MonteCarlo,
    start: usize,
    target: usize,
    kind: usize,
    max_attempts: u64,
    volume_expansion: f64,
    squeeze: bool,
    reporter: &ProgressReporter,
) -> Result<SeekReport, EngineError> {
    let growing = target > start;
    let mut shallow = mc.shallow();

    let total = shallow.total_weight();
    let weight = if total.abs() < f64::EPSILON { 1.0 } else { total / 4.0 };
    let trial = if growing {
        Trial::insert(kind)
    } else {
        Trial::delete(kind)
    };
    shallow.add_trial(trial, weight)?;
    shallow.retain_trials(|t| match t.kind() {
        TrialKind::Insert { .. } => growing,
        TrialKind::Delete { .. } => !growing,
        TrialKind::ReplicaSwap(_) => false,
        _ => true,
    })?;

    let original_volume = shallow.system().space.volume();
    if squeeze {
        shallow.system_mut().space.scale_volume(volume_expansion);
        shallow.system_mut().init_energy()?;
    }

    reporter.report(Progress::PhaseStart {
        name: "Molecule Seek",
    });
    reporter.report(Progress::TaskStart {
        total_steps: start.abs_diff(target) as u64,
    });
    let change = start.abs_diff(target) as f64;
    let mut threshold = PROGRESS_STEP;
    let mut reached = 0;
    let mut attempt = 0;
    while shallow.system().n_molecules() != target && attempt < max_attempts {
        shallow.attempt_trial()?;
        attempt += 1;

        let n = shallow.system().n_molecules();
        let progressed = start.abs_diff(n);
        if progressed > reached {
            reporter.report(Progress::TaskAdvance {
                steps: (progressed - reached) as u64,
            });
            reached = progressed;
        }
        if progressed as f64 / change > threshold {
            let text = format!(
                "molecule seek is more than {} percent done at n={} of {} at attempt {} out of {}",
                threshold * 100.0,
                n,
                target,
                attempt,
                max_attempts
            );
            shallow.comment(&text)?;
            reporter.report(Progress::Message(text));
            threshold += PROGRESS_STEP;
        }
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let n = shallow.system().n_molecules();
    if n != target {
        return Err(EngineError::SeekFailed {
            attempts: attempt,
            target,
            reached: n,
        });
    }

    if squeeze {
        attempt = squeeze_box(&mut shallow, weight, original_volume, attempt, max_attempts)?;
    }

    shallow.comment(&format!(
        "molecule seek done at attempt {} out of {}",
        attempt, max_attempts
    ))?;
    Ok(SeekReport {
        attempts: attempt,
        n_molecules: n,
        compressed: squeeze,
    })
}

/// Runs volume moves at high pressure until the box is no larger than `target_volume`, then
/// rescales it to exactly that volume. Returns the updated attempt count.
fn squeeze_box(
    shallow: &mut ShallowMc<'_>,
    weight: f64,
    target_volume: f64,
    mut attempt: u64,
    max_attempts: u64,
) -> Result<u64, EngineError> {
    let n = shallow.system().n_molecules().max(1) as f64;
    shallow.add_trial(Trial::volume_change(SQUEEZE_MAX_LN_VOLUME), weight / (n / 4.0))?;
    shallow.comment("attempting to squeeze the box back to original size")?;

    while shallow.system().space.volume() > target_volume && attempt < max_attempts {
        shallow.attempt_trial()?;
        attempt += 1;
    }
    let volume = shallow.system().space.volume();
    if volume > target_volume {
        return Err(EngineError::CompressionFailed {
            attempts: attempt,
            volume,
            target_volume,
        });
    }

    let system = shallow.system_mut();
    system.space.scale_volume(target_volume / volume);
    system.init_energy()?;
    Ok(attempt)
}
