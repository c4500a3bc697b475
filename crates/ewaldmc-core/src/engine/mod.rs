//! # Engine Module
//!
//! The stateful half of the library: the Monte Carlo loop, its trial moves and everything a
//! long run needs around them.
//!
//! ## Architecture
//!
//! - **Engine** ([`mc`]) - [`mc::MonteCarlo`] owns the system, the weighted trial set and the
//!   random stream; [`mc::ShallowMc`] borrows it for biased sub-procedures
//! - **System** ([`system`]) - The space, its pair energy and the acceptance criteria kept together
//! - **Trials** ([`trials`]) - Insertion, deletion, translation, volume change,
//!   configurational-bias and replica-swap moves
//! - **Acceptance** ([`criteria`]) - Metropolis and multi-macrostate acceptance rules
//! - **Replica Exchange** ([`mailbox`]) - Key-value drop boxes shared between replicas
//! - **Configuration** ([`config`]) - Housekeeping intervals and output paths
//! - **Progress Monitoring** ([`progress`]) - Progress callbacks for front ends
//! - **Error Handling** ([`error`]) - Engine-specific error types
//!
//! ## Reproducibility
//!
//! Every random number is drawn from one [`rng::McRng`] in attempt order. The stream position is
//! part of each checkpoint, so a resumed run continues exactly where it stopped.

pub mod accumulator;
pub mod config;
pub mod criteria;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod log;
pub mod mailbox;
pub mod mc;
pub mod progress;
pub mod rng;
pub mod sampling;
pub mod system;
pub mod trials;
