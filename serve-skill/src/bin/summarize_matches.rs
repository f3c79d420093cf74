use clap::Parser;
use itertools::Itertools;
use serve_skill::data_processing::ServeMatch;
use serve_skill::experiment_config::ExperimentConfig;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "summarize_matches")]
#[command(about = "Describe the match data a fit would use", long_about = None)]
struct Cli {
    #[arg(long = "start_year")]
    start_year: i32,

    #[arg(long = "include_challengers")]
    include_challengers: bool,

    #[arg(long = "tennis_atp_dir")]
    tennis_atp_dir: Option<PathBuf>,

    #[arg(long, default_value = "v1")]
    preset: String,
}

fn most_active(matches: &[ServeMatch], count: usize) -> Vec<(String, usize)> {
    let mut appearances = HashMap::<&str, usize>::new();
    for m in matches {
        *appearances.entry(m.winner_name.as_str()).or_default() += 1;
        *appearances.entry(m.loser_name.as_str()).or_default() += 1;
    }
    appearances
        .into_iter()
        .sorted_by_key(|&(name, n)| (Reverse(n), name))
        .take(count)
        .map(|(name, n)| (name.to_string(), n))
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = ExperimentConfig::preset(&cli.preset)?;
    config.include_challengers |= cli.include_challengers;
    if let Some(dir) = cli.tennis_atp_dir {
        config.tennis_atp_dir = dir;
    }
    let matches = config.load_serve_matches(cli.start_year)?;

    let n_players = matches
        .iter()
        .flat_map(|m| [&m.winner_name, &m.loser_name])
        .unique()
        .count();
    tracing::info!("Number of matches = {}", matches.len());
    tracing::info!("Number of players = {}", n_players);
    if let (Some(first), Some(last)) = (matches.first(), matches.last()) {
        tracing::info!("Dates from {} to {}", first.date, last.date);
    }

    for (level, group) in &matches
        .iter()
        .sorted_by(|a, b| a.tourney_level.cmp(&b.tourney_level))
        .chunk_by(|m| m.tourney_level.clone())
    {
        tracing::info!("Level {:>2}: {:7} matches", level, group.count());
    }

    for (name, n) in most_active(&matches, 10) {
        tracing::info!("{:30} {:5} matches", name, n);
    }
    Ok(())
}
