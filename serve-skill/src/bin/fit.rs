//! Fits the serve skill model with every configured backend and writes the
//! draws, encoder, runtimes and quality table under `<output_dir>/<start_year>/`.

use anyhow::Context;
use clap::Parser;
use serve_skill::experiment_config::{Experiment, ExperimentConfig};
use serve_skill::summary::write_results;
use serve_skill::telemetry::{get_subscriber, init_subscriber};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fit")]
#[command(about = "Benchmark inference backends on the tennis serve skill model", long_about = None)]
struct Cli {
    /// Only matches from this year onwards are used
    #[arg(long = "start_year")]
    start_year: i32,

    /// Also read the qualifying/challenger tier files
    #[arg(long = "include_challengers")]
    include_challengers: bool,

    /// Directory holding the atp_matches_*.csv files
    #[arg(long = "tennis_atp_dir")]
    tennis_atp_dir: Option<PathBuf>,

    #[arg(long = "output_dir")]
    output_dir: Option<PathBuf>,

    /// Benchmark preset: v1 or v2
    #[arg(long, default_value = "v1")]
    preset: String,

    /// JSON5 experiment file, used instead of the preset
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn experiment_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_file(path)
                .with_context(|| format!("Failed to load experiment file {:?}", path))?,
            None => ExperimentConfig::preset(&self.preset)?,
        };
        config.include_challengers |= self.include_challengers;
        if let Some(dir) = &self.tennis_atp_dir {
            config.tennis_atp_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    init_subscriber(get_subscriber("info", std::io::stdout))?;

    let cli = Cli::parse();
    tracing::info!("Fitting from {} onwards.", cli.start_year);
    let config = cli.experiment_config()?;

    let experiment = Experiment::from_config(&config, cli.start_year)
        .context("Failed to prepare the experiment")?;
    let results = experiment.run().context("Inference failed")?;

    for run in &results.runs {
        tracing::info!("{:>12}: {:10.2}s", run.label, run.secs_elapsed);
    }
    write_results(&experiment.output_dir, &experiment.encoder, &results)
        .with_context(|| format!("Failed to write results to {:?}", experiment.output_dir))?;
    Ok(())
}
