//! # Force Field Module
//!
//! Energy evaluation for the Monte Carlo engine: Lennard-Jones and Ewald-summed Coulomb
//! interactions maintained incrementally across trial moves.
//!
//! ## Key Components
//!
//! - [`params`] - TOML parameter loading and Lorentz-Berthelot mixing
//! - [`term`] - The decomposed energy and its total
//! - [`ewald`] - Wavevectors, per-site phase rows and structure factors
//! - [`pair`] - The propose/commit protocol and the [`pair::LjCoulEwald`] potential
//!
//! ## Usage
//!
//! ```ignore
//! use ewaldmc::core::forcefield::pair::{LjCoulEwald, Operation, Pair};
//!
//! let mut pair = LjCoulEwald::new(params, &space)?;
//! let previous = space.translate_molecule(m, &displacement)?;
//! let de = pair.propose(&space, Operation::Move { previous: &previous }, &sites)?;
//! if accepted { pair.commit()? } else { space.set_molecule_positions(m, &previous)? }
//! ```

pub mod ewald;
pub mod pair;
pub mod params;
pub(crate) mod potentials;
pub mod term;
