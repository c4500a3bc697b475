use super::{TrialOutcome, pick_molecule};
use crate::core::forcefield::pair::Operation;
use crate::core::utils::geometry::random_displacement;
use crate::engine::criteria::{AcceptanceQuery, MoveTag};
use crate::engine::error::EngineError;
use crate::engine::rng::McRng;
use crate::engine::sampling::{boltzmann_sample, ln_boltzmann_sum};
use crate::engine::system::System;
use nalgebra::Vector3;
use tracing::trace;

/// Energy change, relative to the committed `origin`, of placing molecule `mol` at `from`
/// displaced by `displacement`. Returns the probed positions; the space is left at `origin`
/// and no proposal stays pending.
fn probe(
    system: &mut System,
    mol: usize,
    subset: &[usize],
    origin: &[Vector3<f64>],
    from: &[Vector3<f64>],
    displacement: &Vector3<f64>,
) -> Result<(f64, Vec<Vector3<f64>>), EngineError> {
    system.space.set_molecule_positions(mol, from)?;
    system.space.translate_molecule(mol, displacement)?;
    let candidate: Vec<Vector3<f64>> = subset.iter().map(|&s| system.space.positions()[s]).collect();
    let de = system.pair.propose(
        &system.space,
        Operation::Move { previous: origin },
        subset,
    );
    system.pair.discard();
    system.space.set_molecule_positions(mol, origin)?;
    Ok((de?, candidate))
}

/// Multiple-try translation with Rosenbluth weights.
///
/// `candidates` displacements are generated around the current position and one is chosen with
/// Boltzmann probability. The reverse move regenerates `candidates - 1` displacements around
/// the chosen position and includes the original position itself.
pub(super) fn attempt(
    system: &mut System,
    rng: &mut McRng,
    candidates: usize,
    max_move: f64,
) -> Result<TrialOutcome, EngineError> {
    let Some(mol) = pick_molecule(system, rng, None) else {
        return Ok(TrialOutcome::Skipped);
    };
    let subset = system.space.molecule_sites(mol)?;
    let origin: Vec<Vector3<f64>> = subset.iter().map(|&s| system.space.positions()[s]).collect();
    let beta = system.criteria.beta();

    let mut forward = Vec::with_capacity(candidates);
    let mut forward_positions = Vec::with_capacity(candidates);
    for _ in 0..candidates {
        let displacement = random_displacement(rng, max_move);
        let (de, positions) = probe(system, mol, &subset, &origin, &origin, &displacement)?;
        forward.push(de);
        forward_positions.push(positions);
    }
    let (chosen, ln_w_new) = boltzmann_sample(&forward, beta, rng)?;
    let de_chosen = forward[chosen];
    let chosen_positions = &forward_positions[chosen];

    // Reverse trial set around the chosen position; the original position is one of its members.
    let mut reverse = Vec::with_capacity(candidates);
    reverse.push(0.0);
    for _ in 1..candidates {
        let displacement = random_displacement(rng, max_move);
        let (de, _) = probe(system, mol, &subset, &origin, chosen_positions, &displacement)?;
        reverse.push(de);
    }
    let ln_w_old = ln_boltzmann_sum(&reverse, beta);

    let query = AcceptanceQuery {
        ln_ratio: ln_w_new - ln_w_old,
        energy: system.pair.total() + de_chosen,
        tag: MoveTag::ConfigBias,
        macrostate: system.space.n_molecules() as f64,
    };
    trace!(de = de_chosen, candidates, "Configurational-bias move proposed.");

    if system.criteria.accept(&query, rng) {
        system.space.set_molecule_positions(mol, chosen_positions)?;
        system.pair.propose(
            &system.space,
            Operation::Move { previous: &origin },
            &subset,
        )?;
        system.pair.commit()?;
        Ok(TrialOutcome::Accepted)
    } else {
        Ok(TrialOutcome::Rejected)
    }
}
