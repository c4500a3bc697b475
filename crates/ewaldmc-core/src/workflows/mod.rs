//! # Workflows Module
//!
//! Multi-stage procedures built on top of [`crate::engine::mc::MonteCarlo`].
//!
//! - **Molecule Seek** ([`seek`]) - Drives the molecule count to a target with temporarily
//!   biased criteria and trials, then restores the engine.

pub mod seek;
