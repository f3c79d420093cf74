//! Deterministic ADVI: the ELBO is estimated from a fixed set of base draws,
//! which turns variational fitting into a smooth deterministic optimization
//! that L-BFGS can solve to convergence.

use super::lbfgs::{LbfgsConfig, minimize};
use super::{InferenceBackend, PosteriorDraws};
use crate::model::ServeSkillModel;
use crate::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub struct Dadvi {
    pub n_fixed_draws: usize,
    pub draws: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for Dadvi {
    fn default() -> Self {
        Self {
            n_fixed_draws: 30,
            draws: 1000,
            max_iter: 1000,
            seed: 0,
        }
    }
}

fn standard_normals(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| StandardNormal.sample(&mut *rng)).collect()
}

/// Negative fixed-draw ELBO over `[mu.., log_sd..]`, with its gradient.
fn objective(model: &ServeSkillModel, base_draws: &[Vec<f64>], x: &[f64], grad: &mut [f64]) -> f64 {
    let dim = model.dim();
    let (mu, log_sd) = x.split_at(dim);
    let sd: Vec<f64> = log_sd.iter().map(|w| w.exp()).collect();

    // Evaluated in parallel, summed in a fixed order
    let evals: Vec<(f64, Vec<f64>)> = base_draws
        .par_iter()
        .map(|eps| {
            let z: Vec<f64> = (0..dim).map(|i| mu[i] + sd[i] * eps[i]).collect();
            let mut g = vec![0.; dim];
            let logp = model.log_density_and_gradient(&z, &mut g);
            (logp, g)
        })
        .collect();

    let m = base_draws.len() as f64;
    grad.fill(0.);
    let mut sum_logp = 0.;
    let (grad_mu, grad_w) = grad.split_at_mut(dim);
    for ((logp, g), eps) in evals.iter().zip(base_draws) {
        sum_logp += logp;
        for i in 0..dim {
            grad_mu[i] -= g[i] / m;
            grad_w[i] -= g[i] * eps[i] * sd[i] / m;
        }
    }
    grad_w.iter_mut().for_each(|g| *g -= 1.);
    -sum_logp / m - log_sd.iter().sum::<f64>()
}

impl InferenceBackend for Dadvi {
    fn method(&self) -> &'static str {
        "dadvi"
    }

    fn fit(&self, model: &ServeSkillModel) -> Result<PosteriorDraws> {
        if self.n_fixed_draws == 0 || self.draws == 0 {
            return Err(Error::Config(
                "dadvi needs at least one fixed draw and one output draw".into(),
            ));
        }
        let dim = model.dim();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let base_draws: Vec<Vec<f64>> = (0..self.n_fixed_draws)
            .map(|_| standard_normals(&mut rng, dim))
            .collect();

        let mut x0 = model.initial_point();
        x0.resize(2 * dim, 0.);
        let config = LbfgsConfig {
            max_iter: self.max_iter,
            ..LbfgsConfig::default()
        };
        let minimum = minimize(
            |x, grad| objective(model, &base_draws, x, grad),
            x0,
            &config,
        )
        .map_err(|e| Error::backend(self.method(), e.to_string()))?;
        if !minimum.converged {
            tracing::warn!(
                "DADVI optimization did not converge in {} iterations",
                minimum.iterations
            );
        }
        tracing::info!(
            "DADVI objective {:.2} after {} iterations, {} evaluations",
            minimum.fval,
            minimum.iterations,
            minimum.n_evals
        );

        let (mu, log_sd) = minimum.x.split_at(dim);
        let samples: Vec<Vec<f64>> = (0..self.draws)
            .map(|_| {
                let eps = standard_normals(&mut rng, dim);
                (0..dim).map(|i| mu[i] + log_sd[i].exp() * eps[i]).collect()
            })
            .collect();

        Ok(PosteriorDraws::from_unconstrained(self.method(), model, &[samples])
            .with_stat("objective", vec![minimum.trace]))
    }
}
