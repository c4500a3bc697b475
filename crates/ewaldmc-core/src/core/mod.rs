//! # Core Module
//!
//! The stateless and data-level building blocks of the engine.
//!
//! ## Architecture
//!
//! - **Simulation Box** ([`models`]) - Periodic box, rigid molecule templates and site storage
//! - **Energy Calculations** ([`forcefield`]) - Parameters, potentials and the incremental
//!   pair-energy protocol with Ewald summation
//! - **Checkpoint I/O** ([`io`]) - `# key value` record files with class tags
//! - **Geometry** ([`utils`]) - Periodic images and random orientations
//!
//! ## Units
//!
//! Lengths are in Å, energies in kJ/mol and charges in units of the elementary charge.

pub mod forcefield;
pub mod io;
pub mod models;
pub mod utils;
