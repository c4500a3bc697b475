use crate::cli::CheckArgs;
use crate::error::{CliError, Result};
use ewaldmc::core::forcefield::pair::Pair;
use ewaldmc::core::forcefield::term::EnergyTerms;
use ewaldmc::engine::mc::MonteCarlo;
use std::fmt::Write;
use tracing::info;

fn format_terms(terms: &EnergyTerms) -> String {
    let mut out = String::new();
    for (name, value) in [
        ("Lennard-Jones", terms.lj),
        ("LJ tail correction", terms.lrc),
        ("Coulomb (real)", terms.q_real),
        ("Coulomb (Fourier)", terms.q_fourier),
        ("Coulomb (self)", terms.q_self),
        ("Total", terms.total()),
    ] {
        let _ = writeln!(out, "  {:<20} {:>18.8}", name, value);
    }
    out
}

pub fn run(args: CheckArgs) -> Result<()> {
    if !(args.tolerance > 0.0) {
        return Err(CliError::Argument(format!(
            "tolerance must be positive, got {}",
            args.tolerance
        )));
    }

    info!("Restoring simulation from {:?}", &args.checkpoint);
    let mc = MonteCarlo::resume(&args.checkpoint)?;

    println!(
        "Checkpoint at attempt {} with {} molecules in a box of volume {:.4} Å³.",
        mc.n_attempts(),
        mc.system().n_molecules(),
        mc.space().volume()
    );
    println!("Stored energy terms (kJ/mol):");
    print!("{}", format_terms(&mc.pair().terms()));

    let full = mc
        .pair()
        .check_energy(mc.space(), args.tolerance)
        .map_err(ewaldmc::engine::error::EngineError::from)?;
    println!(
        "✓ Full recomputation agrees within {:e} kJ/mol (total {:.8}).",
        args.tolerance, full
    );
    Ok(())
}
