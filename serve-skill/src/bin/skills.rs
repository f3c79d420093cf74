use anyhow::Context;
use clap::Parser;
use serve_skill::data_processing::write_slice_to_file;
use serve_skill::summary::{draws_file_name, make_leaderboard, read_draws, read_encoder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skills")]
#[command(about = "Tabulate per-player skills from a finished fit", long_about = None)]
struct Cli {
    /// A run directory written by `fit`, e.g. fit_results/2015
    run_dir: PathBuf,

    /// Label of the backend whose draws are summarized
    #[arg(long, default_value = "nuts")]
    label: String,

    /// Number of players to log
    #[arg(long, default_value = "20")]
    top: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let encoder = read_encoder(&cli.run_dir).context("Failed to read the encoder")?;
    let draws_path = cli.run_dir.join(draws_file_name(&cli.label));
    let draws =
        read_draws(&draws_path).with_context(|| format!("Failed to read {:?}", draws_path))?;
    let leaderboard = make_leaderboard(&draws, &encoder)?;

    for entry in leaderboard.iter().take(cli.top) {
        tracing::info!(
            "{:4} {:30} serve {:+.3} return {:+.3}",
            entry.rank,
            entry.name,
            entry.server_skill,
            entry.returner_skill
        );
    }
    let out = cli.run_dir.join(format!("{}_skills.csv", cli.label));
    write_slice_to_file(&leaderboard, &out)?;
    Ok(())
}
