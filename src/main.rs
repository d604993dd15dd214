use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

#[derive(Parser)]
#[command(name = "rebyval")]
#[command(about = "Trains students, then a supervisor on their weights, then students against it")]
struct Args {
    /// Path to the experiment document
    #[arg(long, default_value = "./configs/rebyval.json")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let outcome = rebyval::run_experiment(&args.config)
        .with_context(|| format!("experiment {} failed", args.config.display()))?;

    info!(
        "{} students, {} supervisor trainings, {} samples",
        outcome.students, outcome.supervisor_trains, outcome.samples
    );

    Ok(())
}
