use super::{TrialOutcome, pick_molecule};
use crate::core::forcefield::pair::Operation;
use crate::core::models::space::DeleteMode;
use crate::core::utils::geometry::random_orientation;
use crate::engine::criteria::{AcceptanceQuery, MoveTag};
use crate::engine::error::EngineError;
use crate::engine::rng::McRng;
use crate::engine::system::System;
use tracing::trace;

pub(super) fn insert(system: &mut System, rng: &mut McRng, kind: usize) -> Result<TrialOutcome, EngineError> {
    let activity = system.activity(kind)?;
    let anchor = system.space.random_position(rng);
    let orientation = random_orientation(rng);
    let mol = system.space.add_molecule(kind, anchor, &orientation)?;
    let subset = system.space.molecule_sites(mol)?;

    let de = system.pair.propose(&system.space, Operation::Insert, &subset)?;
    let n_after = system.space.n_molecules_of(kind) as f64;
    let beta = system.criteria.beta();
    let query = AcceptanceQuery {
        ln_ratio: (activity * system.space.volume() / n_after).ln() - beta * de,
        energy: system.pair.total() + de,
        tag: MoveTag::Insert,
        macrostate: system.space.n_molecules() as f64,
    };
    trace!(de, kind, "Insertion proposed.");

    if system.criteria.accept(&query, rng) {
        system.pair.commit()?;
        Ok(TrialOutcome::Accepted)
    } else {
        // The pair never committed the trailing rows, so only the space is truncated.
        system.pair.discard();
        system.space.remove_molecule(mol, DeleteMode::Stable)?;
        Ok(TrialOutcome::Rejected)
    }
}

pub(super) fn delete(system: &mut System, rng: &mut McRng, kind: usize) -> Result<TrialOutcome, EngineError> {
    let activity = system.activity(kind)?;
    let n_before = system.space.n_molecules_of(kind);
    let Some(mol) = pick_molecule(system, rng, Some(kind)) else {
        return Ok(TrialOutcome::Rejected);
    };
    let subset = system.space.molecule_sites(mol)?;

    let removed = system.pair.propose(&system.space, Operation::Delete, &subset)?;
    let beta = system.criteria.beta();
    let query = AcceptanceQuery {
        ln_ratio: (n_before as f64 / (activity * system.space.volume())).ln() + beta * removed,
        energy: system.pair.total() - removed,
        tag: MoveTag::Delete,
        macrostate: (system.space.n_molecules() - 1) as f64,
    };
    trace!(removed, kind, "Deletion proposed.");

    if system.criteria.accept(&query, rng) {
        system.pair.commit()?;
        system.remove_molecule(mol)?;
        Ok(TrialOutcome::Accepted)
    } else {
        system.pair.discard();
        Ok(TrialOutcome::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;

    #[test]
    fn accepted_insertions_keep_energy_consistent() {
        let mut system = fixtures::system(fixtures::empty_space(9.0), 8);
        system.criteria.set_activity(fixtures::KIND_DIMER, 10.0);
        let mut rng = McRng::seed_from_u64(11);
        let mut accepted = 0;
        for _ in 0..40 {
            if insert(&mut system, &mut rng, fixtures::KIND_DIMER).unwrap() == TrialOutcome::Accepted {
                accepted += 1;
            }
            fixtures::assert_consistent(&system);
        }
        assert!(accepted > 0);
        assert_eq!(system.space.n_molecules(), accepted);
    }

    #[test]
    fn rejected_insertion_restores_space_and_caches() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, true), 8);
        system.criteria.set_activity(fixtures::KIND_ATOM, 0.0);
        let before = system.space.clone();
        let energy = system.energy();
        let mut rng = McRng::seed_from_u64(4);

        assert_eq!(
            insert(&mut system, &mut rng, fixtures::KIND_ATOM).unwrap(),
            TrialOutcome::Rejected
        );
        assert_eq!(system.space, before);
        assert_eq!(system.energy(), energy);
        fixtures::assert_consistent(&system);

        system.criteria.set_activity(fixtures::KIND_ATOM, 1e12);
        for _ in 0..5 {
            insert(&mut system, &mut rng, fixtures::KIND_ATOM).unwrap();
            fixtures::assert_consistent(&system);
        }
    }

    #[test]
    fn deletion_from_an_empty_kind_is_rejected() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, false), 8);
        let mut rng = McRng::seed_from_u64(4);
        assert_eq!(
            delete(&mut system, &mut rng, fixtures::KIND_DIMER).unwrap(),
            TrialOutcome::Rejected
        );
    }

    #[test]
    fn accepted_deletions_keep_energy_consistent() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, true), 8);
        system.criteria.set_activity(fixtures::KIND_ATOM, 1e-6);
        let mut rng = McRng::seed_from_u64(5);
        for _ in 0..20 {
            delete(&mut system, &mut rng, fixtures::KIND_ATOM).unwrap();
            fixtures::assert_consistent(&system);
        }
        assert_eq!(system.space.n_molecules_of(fixtures::KIND_ATOM), 0);
        assert_eq!(system.space.n_molecules_of(fixtures::KIND_DIMER), 4);
    }

    #[test]
    fn missing_activity_is_an_error() {
        let mut system = fixtures::system(fixtures::empty_space(9.0), 8);
        let mut rng = McRng::seed_from_u64(4);
        assert!(matches!(
            insert(&mut system, &mut rng, 5),
            Err(EngineError::MissingActivity { kind: 5 })
        ));
    }
}
