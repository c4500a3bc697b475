//! Provides checkpoint input/output.
//!
//! Checkpoints are line-oriented text files made of `# key value` records followed by
//! optional body lines. Compound state is split across several files, each carrying its
//! own class tag so that it can be reconstructed late.

pub mod record;
pub mod traits;
