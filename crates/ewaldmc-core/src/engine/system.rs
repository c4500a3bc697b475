use super::criteria::Criteria;
use super::error::EngineError;
use crate::core::forcefield::pair::Pair;
use crate::core::models::space::Space;

/// The simulated state a trial operates on: configuration, potential and acceptance rule.
#[derive(Debug, Clone)]
pub struct System {
    pub space: Space,
    pub pair: Box<dyn Pair>,
    pub criteria: Criteria,
}

impl System {
    pub fn new(space: Space, pair: Box<dyn Pair>, criteria: Criteria) -> Self {
        Self {
            space,
            pair,
            criteria,
        }
    }

    pub fn init_energy(&mut self) -> Result<f64, EngineError> {
        Ok(self.pair.init_energy(&self.space)?)
    }

    pub fn energy(&self) -> f64 {
        self.pair.total()
    }

    pub fn n_molecules(&self) -> usize {
        self.space.n_molecules()
    }

    /// Removes a molecule from the space and replays the removal on the pair's caches.
    pub(crate) fn remove_molecule(&mut self, index: usize) -> Result<(), EngineError> {
        let removal = self.space.remove_molecule(index, self.pair.delete_mode())?;
        self.pair.apply_removal(&removal)?;
        Ok(())
    }

    /// Activity of `kind`, required by trials that change the molecule count.
    pub(crate) fn activity(&self, kind: usize) -> Result<f64, EngineError> {
        self.criteria
            .activity(kind)
            .ok_or(EngineError::MissingActivity { kind })
    }
}
