use crate::backends::PosteriorDraws;
use crate::data_processing::{read_json, write_slice_to_file, write_to_json};
use crate::encoder::PlayerEncoder;
use crate::experiment_config::ExperimentResults;
use crate::quality::quality_table;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const ENCODER_FILE: &str = "encoder.json";
pub const RUNTIMES_FILE: &str = "runtimes.csv";
pub const QUALITY_FILE: &str = "quality.csv";

pub fn draws_file_name(label: &str) -> String {
    format!("{}_draws.json", label)
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RuntimeRow {
    pub method: String,
    pub seconds: f64,
}

/// Writes every artifact of a finished run into `dir`, creating it if needed.
/// Existing files are overwritten.
pub fn write_results(
    dir: impl AsRef<Path>,
    encoder: &PlayerEncoder,
    results: &ExperimentResults,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    for run in &results.runs {
        write_draws(&run.draws, dir.join(draws_file_name(&run.label)))?;
    }
    write_to_json(encoder, dir.join(ENCODER_FILE))?;

    let runtimes: Vec<RuntimeRow> = results
        .runs
        .iter()
        .map(|run| RuntimeRow {
            method: run.label.clone(),
            seconds: run.secs_elapsed,
        })
        .collect();
    write_slice_to_file(&runtimes, dir.join(RUNTIMES_FILE))?;

    match quality_table(&results.runs) {
        Some(table) => write_slice_to_file(&table, dir.join(QUALITY_FILE))?,
        None => tracing::info!("No reference run, skipping {}", QUALITY_FILE),
    }
    Ok(())
}

/// Draws can run to millions of numbers, so they're written without indentation.
pub fn write_draws(draws: &PosteriorDraws, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(std::fs::File::create(path.as_ref())?);
    serde_json::to_writer(&mut writer, draws)?;
    writer.flush()?;
    tracing::info!("Successfully wrote to {:?}", path.as_ref());
    Ok(())
}

pub fn read_draws(path: impl AsRef<Path>) -> Result<PosteriorDraws> {
    read_json(path)
}

pub fn read_encoder(dir: impl AsRef<Path>) -> Result<PlayerEncoder> {
    read_json(dir.as_ref().join(ENCODER_FILE))
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerSkillSummary {
    pub rank: usize,
    pub name: String,
    pub server_skill: f64,
    pub server_skill_sd: f64,
    pub returner_skill: f64,
    pub returner_skill_sd: f64,
    pub total_skill: f64,
}

/// Ranks players by the sum of their posterior mean serve and return skills.
pub fn make_leaderboard(
    draws: &PosteriorDraws,
    encoder: &PlayerEncoder,
) -> Result<Vec<PlayerSkillSummary>> {
    let serve = draws.element_summaries("server_skills");
    let ret = draws.element_summaries("returner_skills");
    if serve.len() != encoder.len() || ret.len() != encoder.len() {
        return Err(Error::Parse(format!(
            "draws hold {} players but the encoder has {}",
            serve.len(),
            encoder.len()
        )));
    }

    let mut leaderboard = serve
        .iter()
        .zip(&ret)
        .enumerate()
        .map(|(id, (&(s_mean, s_sd), &(r_mean, r_sd)))| {
            Ok(PlayerSkillSummary {
                rank: 0,
                name: encoder.inverse_transform(id)?.to_string(),
                server_skill: s_mean,
                server_skill_sd: s_sd,
                returner_skill: r_mean,
                returner_skill_sd: r_sd,
                total_skill: s_mean + r_mean,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    leaderboard.sort_by(|a, b| {
        b.total_skill
            .total_cmp(&a.total_skill)
            .then_with(|| a.name.cmp(&b.name))
    });
    for (rank, entry) in leaderboard.iter_mut().enumerate() {
        entry.rank = rank + 1;
    }
    Ok(leaderboard)
}
