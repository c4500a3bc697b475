use crate::cli::ResumeArgs;
use crate::error::{CliError, Result};
use crate::progress::AttemptBar;
use ewaldmc::engine::mc::MonteCarlo;
use ewaldmc::engine::progress::ProgressReporter;
use tracing::info;

pub fn run(args: ResumeArgs) -> Result<()> {
    if args.attempts == 0 {
        return Err(CliError::Argument(
            "the number of attempts must be positive".to_string(),
        ));
    }

    info!("Restoring simulation from {:?}", &args.checkpoint);
    let mut mc = MonteCarlo::resume(&args.checkpoint)?;
    println!(
        "Resumed at attempt {} with {} molecules.",
        mc.n_attempts(),
        mc.system().n_molecules()
    );

    let bar = AttemptBar::new();
    let reporter = ProgressReporter::with_callback(bar.callback());
    mc.run_with_progress(args.attempts, &reporter)?;

    let output = args.checkpoint_out.as_ref().unwrap_or(&args.checkpoint);
    mc.write_checkpoint(output)?;

    println!(
        "✓ Attempt {}: {} molecules, {:.6} kJ/mol per molecule (running average {:.6}).",
        mc.n_attempts(),
        mc.system().n_molecules(),
        mc.pe_per_mol(),
        mc.pe_accumulator().average()
    );
    println!("  Checkpoint written to: {}", output.display());
    Ok(())
}
