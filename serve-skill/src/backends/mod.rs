mod adapt;
mod advi;
mod dadvi;
mod lbfgs;
mod nuts;

pub use advi::Advi;
pub use dadvi::Dadvi;
pub use lbfgs::{LbfgsConfig, Minimum, minimize};
pub use nuts::Nuts;

use crate::model::ServeSkillModel;
use crate::numerical::mean_and_sd;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An approximate inference algorithm. Backends only read the model; each
/// call to `fit` is independent of any other.
pub trait InferenceBackend: std::fmt::Debug {
    /// Short method name recorded in the draws, e.g. "nuts".
    fn method(&self) -> &'static str;

    fn fit(&self, model: &ServeSkillModel) -> Result<PosteriorDraws>;
}

/// Posterior draws on the constrained scale, keyed by variable name and
/// indexed `[chain][draw][element]`. Variational backends report a single chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PosteriorDraws {
    pub method: String,
    pub n_chains: usize,
    pub n_draws: usize,
    pub posterior: BTreeMap<String, Vec<Vec<Vec<f64>>>>,
    /// Per-draw diagnostics indexed `[chain][draw]`, or optimizer traces
    /// stored as a single chain.
    #[serde(default)]
    pub sample_stats: BTreeMap<String, Vec<Vec<f64>>>,
}

impl PosteriorDraws {
    pub fn from_unconstrained(method: &str, model: &ServeSkillModel, chains: &[Vec<Vec<f64>>]) -> Self {
        let mut posterior: BTreeMap<String, Vec<Vec<Vec<f64>>>> = BTreeMap::new();
        for (chain_index, chain) in chains.iter().enumerate() {
            for z in chain {
                let params = model.constrain(z);
                for (name, values) in params.variables() {
                    let per_chain = posterior.entry(name.to_string()).or_default();
                    if per_chain.len() <= chain_index {
                        per_chain.resize_with(chain_index + 1, Vec::new);
                    }
                    per_chain[chain_index].push(values.to_vec());
                }
            }
        }
        Self {
            method: method.to_string(),
            n_chains: chains.len(),
            n_draws: chains.first().map_or(0, Vec::len),
            posterior,
            sample_stats: BTreeMap::new(),
        }
    }

    pub fn with_stat(mut self, name: &str, values: Vec<Vec<f64>>) -> Self {
        self.sample_stats.insert(name.to_string(), values);
        self
    }

    /// Posterior mean and standard deviation of each element of a variable,
    /// pooling all chains.
    pub fn element_summaries(&self, name: &str) -> Vec<(f64, f64)> {
        let Some(chains) = self.posterior.get(name) else {
            return vec![];
        };
        let len = chains
            .first()
            .and_then(|draws| draws.first())
            .map_or(0, Vec::len);
        (0..len)
            .map(|i| mean_and_sd(chains.iter().flatten().map(move |draw| draw[i])))
            .collect()
    }
}

fn param_or(params: &[f64], index: usize, default: f64) -> f64 {
    params.get(index).copied().unwrap_or(default)
}

fn count_param(params: &[f64], index: usize, default: usize) -> Result<usize> {
    let value = param_or(params, index, default as f64);
    if value < 0. || value.fract() != 0. {
        return Err(Error::Config(format!(
            "parameter {} must be a non-negative integer, got {}",
            index, value
        )));
    }
    Ok(value as usize)
}

/// Builds a backend from a method name and positional parameters. Missing
/// trailing parameters take their default values:
///
/// - `nuts`: `[tune, draws, chains, target_accept, max_treedepth]`
/// - `advi`: `[n_iter, draws, learning_rate]`
/// - `dadvi`: `[n_fixed_draws, draws, max_iter]`
pub fn make_backend(
    method: &str,
    params: &[f64],
    seed: u64,
) -> Result<Box<dyn InferenceBackend + Send + Sync>> {
    let max_params = match method {
        "nuts" => 5,
        "advi" | "dadvi" => 3,
        name => {
            return Err(Error::Config(format!(
                "{} is not a valid inference method. Must be one of: nuts, advi, dadvi",
                name
            )));
        }
    };
    if params.len() > max_params {
        return Err(Error::Config(format!(
            "{} takes at most {} parameters, got {}",
            method,
            max_params,
            params.len()
        )));
    }

    Ok(match method {
        "nuts" => {
            let default = Nuts::default();
            Box::new(Nuts {
                tune: count_param(params, 0, default.tune)?,
                draws: count_param(params, 1, default.draws)?,
                chains: count_param(params, 2, default.chains)?,
                target_accept: param_or(params, 3, default.target_accept),
                max_treedepth: count_param(params, 4, default.max_treedepth)?,
                seed,
            })
        }
        "advi" => {
            let default = Advi::default();
            Box::new(Advi {
                n_iter: count_param(params, 0, default.n_iter)?,
                draws: count_param(params, 1, default.draws)?,
                learning_rate: param_or(params, 2, default.learning_rate),
                seed,
                ..default
            })
        }
        _ => {
            let default = Dadvi::default();
            Box::new(Dadvi {
                n_fixed_draws: count_param(params, 0, default.n_fixed_draws)?,
                draws: count_param(params, 1, default.draws)?,
                max_iter: count_param(params, 2, default.max_iter)?,
                seed,
            })
        }
    })
}
