use super::{TrialOutcome, pick_molecule};
use crate::core::forcefield::pair::Operation;
use crate::core::utils::geometry::random_displacement;
use crate::engine::criteria::{AcceptanceQuery, MoveTag};
use crate::engine::error::EngineError;
use crate::engine::rng::McRng;
use crate::engine::system::System;
use tracing::trace;

pub(super) fn attempt(system: &mut System, rng: &mut McRng, max_move: f64) -> Result<TrialOutcome, EngineError> {
    let Some(mol) = pick_molecule(system, rng, None) else {
        return Ok(TrialOutcome::Skipped);
    };
    let subset = system.space.molecule_sites(mol)?;
    let displacement = random_displacement(rng, max_move);
    let previous = system.space.translate_molecule(mol, &displacement)?;

    let de = system.pair.propose(
        &system.space,
        Operation::Move {
            previous: &previous,
        },
        &subset,
    )?;
    let query = AcceptanceQuery {
        ln_ratio: -system.criteria.beta() * de,
        energy: system.pair.total() + de,
        tag: MoveTag::Translate,
        macrostate: system.space.n_molecules() as f64,
    };
    trace!(de, mol, "Translation proposed.");

    if system.criteria.accept(&query, rng) {
        system.pair.commit()?;
        Ok(TrialOutcome::Accepted)
    } else {
        system.pair.discard();
        system.space.set_molecule_positions(mol, &previous)?;
        Ok(TrialOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;

    #[test]
    fn translations_keep_energy_consistent() {
        let mut system = fixtures::system(fixtures::lattice_space(3, 2.5, true), 8);
        let mut rng = McRng::seed_from_u64(21);
        let mut outcomes = Vec::new();
        for _ in 0..100 {
            outcomes.push(attempt(&mut system, &mut rng, 0.4).unwrap());
            fixtures::assert_consistent(&system);
        }
        assert!(outcomes.contains(&TrialOutcome::Accepted));
    }

    #[test]
    fn rejected_translation_restores_positions() {
        let mut space = fixtures::empty_space(10.0);
        let identity = nalgebra::UnitQuaternion::identity();
        let r_min = 2f64.powf(1.0 / 6.0);
        space
            .add_molecule(fixtures::KIND_ATOM, nalgebra::Vector3::new(5.0, 5.0, 5.0), &identity)
            .unwrap();
        space
            .add_molecule(fixtures::KIND_ATOM, nalgebra::Vector3::new(5.0 + r_min, 5.0, 5.0), &identity)
            .unwrap();
        let mut system = fixtures::system(space, 8);
        // The pair sits at the LJ minimum, so every move is uphill and is rejected.
        system.criteria.set_beta(1e12);
        let before = system.space.clone();
        let mut rng = McRng::seed_from_u64(21);

        assert_eq!(attempt(&mut system, &mut rng, 0.3).unwrap(), TrialOutcome::Rejected);
        assert_eq!(system.space, before);
        fixtures::assert_consistent(&system);
    }
}
