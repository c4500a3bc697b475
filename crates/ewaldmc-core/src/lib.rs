//! # ewaldmc Core Library
//!
//! A Monte Carlo engine for off-lattice molecular simulation in which the Lennard-Jones and
//! Ewald-summed Coulomb energy is maintained incrementally across trial moves.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three layers throughout:
//!
//! - **[`core`]: The Foundation.** The periodic box and its molecules, force-field parameters,
//!   the incremental pair-energy protocol with its reciprocal-space cache, and checkpoint records.
//!
//! - **[`engine`]: The Logic Core.** The stateful Monte Carlo loop: weighted trial selection,
//!   acceptance criteria, housekeeping (checkpoints, consistency checks, logging, tuning) and
//!   configuration exchange between replicas.
//!
//! - **[`workflows`]: The Public API.** Multi-stage procedures such as driving the molecule
//!   count to a target before production.

pub mod core;
pub mod engine;
pub mod workflows;
