use crate::backends::{InferenceBackend, PosteriorDraws, make_backend};
use crate::data_processing::{FilterParams, ServeMatch, derive_serve_matches, load_matches};
use crate::encoder::PlayerEncoder;
use crate::model::ServeSkillModel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BackendParams {
    /// Names the output files and the runtime row, e.g. "advi_longer".
    pub label: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<f64>,
}

impl BackendParams {
    fn new(label: &str, method: &str, params: &[f64]) -> Self {
        Self {
            label: label.to_string(),
            method: method.to_string(),
            params: params.to_vec(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tennis_atp/")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./fit_results")
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub include_challengers: bool,
    #[serde(default)]
    pub exclude_tourney_level: Option<String>,
    #[serde(default = "default_data_dir")]
    pub tennis_atp_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub seed: u64,
    pub backends: Vec<BackendParams>,
}

impl ExperimentConfig {
    pub fn from_file(source: impl AsRef<Path>) -> Result<Self> {
        // json5 tolerates comments and trailing commas in hand-written experiment files
        let params_json = std::fs::read_to_string(source.as_ref())?;
        let config: Self = json5::from_str(&params_json)
            .map_err(|e| Error::Config(format!("{:?}: {}", source.as_ref(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The first benchmark: every tour-level match, with two ADVI budgets.
    pub fn v1() -> Self {
        Self {
            include_challengers: false,
            exclude_tourney_level: None,
            tennis_atp_dir: default_data_dir(),
            output_dir: default_output_dir(),
            seed: 0,
            backends: vec![
                BackendParams::new("dadvi", "dadvi", &[]),
                BackendParams::new("advi", "advi", &[10000.]),
                BackendParams::new("advi_longer", "advi", &[100000.]),
                BackendParams::new("nuts", "nuts", &[]),
            ],
        }
    }

    /// The second benchmark: Davis Cup ties are excluded and the challenger
    /// tier may be added with `include_challengers`.
    pub fn v2() -> Self {
        Self {
            exclude_tourney_level: Some("D".into()),
            backends: vec![
                BackendParams::new("nuts", "nuts", &[]),
                BackendParams::new("dadvi", "dadvi", &[]),
                BackendParams::new("advi", "advi", &[10000.]),
            ],
            ..Self::v1()
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "v1" => Ok(Self::v1()),
            "v2" => Ok(Self::v2()),
            x => Err(Error::Config(format!(
                "'{}' is not a valid preset. Must be one of: v1, v2",
                x
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(Error::Config("at least one backend is required".into()));
        }
        let mut labels = HashSet::new();
        for backend in &self.backends {
            if backend.label.is_empty() || !labels.insert(backend.label.as_str()) {
                return Err(Error::Config(format!(
                    "backend labels must be non-empty and unique, got {:?}",
                    backend.label
                )));
            }
        }
        Ok(())
    }

    pub fn filter_params(&self, start_year: i32) -> FilterParams {
        FilterParams {
            start_year,
            exclude_tourney_level: self.exclude_tourney_level.clone(),
        }
    }

    /// Loads and filters the match data this configuration describes.
    pub fn load_serve_matches(&self, start_year: i32) -> Result<Vec<ServeMatch>> {
        let records = load_matches(&self.tennis_atp_dir, self.include_challengers)?;
        derive_serve_matches(&records, &self.filter_params(start_year))
    }
}

#[derive(Debug)]
pub struct Experiment {
    pub start_year: i32,
    pub encoder: PlayerEncoder,
    pub model: ServeSkillModel,
    pub backends: Vec<(String, Box<dyn InferenceBackend + Send + Sync>)>,
    pub output_dir: PathBuf,
}

impl Experiment {
    pub fn from_config(config: &ExperimentConfig, start_year: i32) -> Result<Self> {
        tracing::info!("Loading experiment:\n{:?}", config);
        config.validate()?;
        // Backends are checked before any data is read
        let backends = config
            .backends
            .iter()
            .map(|b| -> Result<_> {
                Ok((b.label.clone(), make_backend(&b.method, &b.params, config.seed)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let matches = config.load_serve_matches(start_year)?;
        let encoder = PlayerEncoder::fit(
            matches
                .iter()
                .flat_map(|m| [m.winner_name.as_str(), m.loser_name.as_str()]),
        );
        let model = ServeSkillModel::build(&matches, &encoder)?;

        Ok(Self {
            start_year,
            encoder,
            model,
            backends,
            output_dir: config.output_dir.join(start_year.to_string()),
        })
    }

    /// Runs every backend in order against the same model. The first failure
    /// aborts the whole run.
    pub fn run(&self) -> Result<ExperimentResults> {
        let mut runs = Vec::with_capacity(self.backends.len());
        for (label, backend) in &self.backends {
            tracing::info!("Fitting {} with {:?}", label, backend);
            let now = std::time::Instant::now();
            let draws = backend.fit(&self.model)?;
            let secs_elapsed = now.elapsed().as_nanos() as f64 * 1e-9;
            tracing::info!("{} took {:.2}s", label, secs_elapsed);
            runs.push(BackendRun {
                label: label.clone(),
                draws,
                secs_elapsed,
            });
        }
        Ok(ExperimentResults { runs })
    }
}

#[derive(Debug)]
pub struct BackendRun {
    pub label: String,
    pub draws: PosteriorDraws,
    pub secs_elapsed: f64,
}

#[derive(Debug)]
pub struct ExperimentResults {
    pub runs: Vec<BackendRun>,
}
