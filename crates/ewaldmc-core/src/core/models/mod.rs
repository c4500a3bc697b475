//! The simulation box and its molecules.

pub mod space;
