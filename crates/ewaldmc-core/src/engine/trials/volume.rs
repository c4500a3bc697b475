use super::TrialOutcome;
use crate::core::forcefield::pair::Operation;
use crate::engine::criteria::{AcceptanceQuery, MoveTag};
use crate::engine::error::EngineError;
use crate::engine::rng::McRng;
use crate::engine::system::System;
use tracing::trace;

/// Isobaric volume move: a uniform step in `ln V` with molecules scaled rigidly.
pub(super) fn attempt(
    system: &mut System,
    rng: &mut McRng,
    max_ln_volume: f64,
) -> Result<TrialOutcome, EngineError> {
    let pressure = system.criteria.pressure().ok_or(EngineError::PressureRequired)?;
    let saved = system.space.clone();
    let volume = saved.volume();

    let d_ln_volume = (2.0 * rng.uniform() - 1.0) * max_ln_volume;
    system.space.scale_volume(d_ln_volume.exp());
    let new_volume = system.space.volume();

    let energy = system.pair.total();
    let new_energy = system.pair.propose(&system.space, Operation::Rebuild, &[])?;
    let de = new_energy - energy;
    let n = system.space.n_molecules() as f64;
    let beta = system.criteria.beta();
    let query = AcceptanceQuery {
        ln_ratio: -beta * (de + pressure * (new_volume - volume)) + (n + 1.0) * (new_volume / volume).ln(),
        energy: new_energy,
        tag: MoveTag::VolumeChange,
        macrostate: n,
    };
    trace!(de, volume, new_volume, "Volume change proposed.");

    if system.criteria.accept(&query, rng) {
        system.pair.commit()?;
        Ok(TrialOutcome::Accepted)
    } else {
        system.pair.discard();
        system.space = saved;
        Ok(TrialOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;

    #[test]
    fn volume_moves_require_a_pressure() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, false), 8);
        let mut rng = McRng::seed_from_u64(1);
        assert!(matches!(
            attempt(&mut system, &mut rng, 0.01),
            Err(EngineError::PressureRequired)
        ));
    }

    #[test]
    fn volume_moves_keep_energy_consistent() {
        let mut system = fixtures::system(fixtures::lattice_space(3, 2.5, true), 8);
        system.criteria.set_pressure(Some(1e-3));
        let mut rng = McRng::seed_from_u64(9);
        let mut accepted = false;
        for _ in 0..30 {
            accepted |= attempt(&mut system, &mut rng, 0.002).unwrap() == TrialOutcome::Accepted;
            fixtures::assert_consistent(&system);
        }
        assert!(accepted);
    }

    #[test]
    fn rejected_volume_move_restores_box() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, false), 8);
        // An enormous pressure rejects every expansion.
        system.criteria.set_pressure(Some(1e12));
        let mut rng = McRng::seed_from_u64(2);
        for _ in 0..50 {
            let before = system.space.clone();
            let energy = system.energy();
            if attempt(&mut system, &mut rng, 0.01).unwrap() == TrialOutcome::Rejected {
                assert_eq!(system.space, before);
                assert_eq!(system.energy(), energy);
                return;
            }
        }
        panic!("no expansion was attempted");
    }
}
