//! Mean-field ADVI: a diagonal Gaussian over the unconstrained space, fit by
//! stochastic gradient ascent on a one-sample ELBO estimate.

use super::{InferenceBackend, PosteriorDraws};
use crate::model::ServeSkillModel;
use crate::numerical::{sigmoid, softplus};
use crate::{Error, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub struct Advi {
    pub n_iter: usize,
    pub draws: usize,
    pub learning_rate: f64,
    /// Number of recent squared gradients the step-size normalizer sums over.
    pub window: usize,
    pub seed: u64,
}

impl Default for Advi {
    fn default() -> Self {
        Self {
            n_iter: 10000,
            draws: 1000,
            learning_rate: 1e-3,
            window: 10,
            seed: 0,
        }
    }
}

/// Adagrad over a sliding window of squared gradients, with the same
/// epsilon as PyMC's `adagrad_window`.
struct WindowedAdagrad {
    learning_rate: f64,
    window: usize,
    recent: VecDeque<Vec<f64>>,
    accum: Vec<f64>,
}

impl WindowedAdagrad {
    const EPSILON: f64 = 0.1;

    fn new(dim: usize, learning_rate: f64, window: usize) -> Self {
        Self {
            learning_rate,
            window: window.max(1),
            recent: VecDeque::with_capacity(window),
            accum: vec![0.; dim],
        }
    }

    /// Applies an ascent step along `grad` to `params`.
    fn step(&mut self, params: &mut [f64], grad: &[f64]) {
        let squared: Vec<f64> = grad.iter().map(|g| g * g).collect();
        for (a, s) in self.accum.iter_mut().zip(&squared) {
            *a += s;
        }
        self.recent.push_back(squared);
        if self.recent.len() > self.window
            && let Some(old) = self.recent.pop_front()
        {
            for (a, s) in self.accum.iter_mut().zip(old) {
                *a = (*a - s).max(0.);
            }
        }
        for ((p, g), a) in params.iter_mut().zip(grad).zip(&self.accum) {
            *p += self.learning_rate * g / (a + Self::EPSILON).sqrt();
        }
    }
}

impl InferenceBackend for Advi {
    fn method(&self) -> &'static str {
        "advi"
    }

    fn fit(&self, model: &ServeSkillModel) -> Result<PosteriorDraws> {
        if self.draws == 0 {
            return Err(Error::Config("advi needs at least one draw".into()));
        }
        let dim = model.dim();
        let mut rng = StdRng::seed_from_u64(self.seed);

        // Variational parameters laid out as [mu.., rho..], sd = softplus(rho)
        let mut params = model.initial_point();
        params.resize(2 * dim, 0.);
        let mut optimizer = WindowedAdagrad::new(2 * dim, self.learning_rate, self.window);

        let mut eps = vec![0.; dim];
        let mut z = vec![0.; dim];
        let mut grad_logp = vec![0.; dim];
        let mut grad = vec![0.; 2 * dim];
        let mut losses = Vec::with_capacity(self.n_iter);

        for iter in 0..self.n_iter {
            let (mu, rho) = params.split_at(dim);
            let mut entropy = 0.;
            for i in 0..dim {
                eps[i] = StandardNormal.sample(&mut rng);
                let sd = softplus(rho[i]);
                z[i] = mu[i] + sd * eps[i];
                entropy += sd.ln();
            }
            let logp = model.log_density_and_gradient(&z, &mut grad_logp);
            let loss = -(logp + entropy);
            if !loss.is_finite() {
                return Err(Error::backend(
                    self.method(),
                    format!("loss became non-finite at iteration {}", iter),
                ));
            }
            losses.push(loss);

            let (grad_mu, grad_rho) = grad.split_at_mut(dim);
            for i in 0..dim {
                let sd = softplus(rho[i]);
                grad_mu[i] = grad_logp[i];
                grad_rho[i] = (grad_logp[i] * eps[i] + sd.recip()) * sigmoid(rho[i]);
            }
            optimizer.step(&mut params, &grad);

            if (iter + 1) % 10000 == 0 {
                tracing::debug!("ADVI iteration {}: loss {:.2}", iter + 1, loss);
            }
        }
        if let Some(last) = losses.last() {
            tracing::info!("ADVI finished {} iterations with loss {:.2}", self.n_iter, last);
        }

        let (mu, rho) = params.split_at(dim);
        let sd: Vec<f64> = rho.iter().map(|&r| softplus(r)).collect();
        let samples: Vec<Vec<f64>> = (0..self.draws)
            .map(|_| {
                mu.iter()
                    .zip(&sd)
                    .map(|(m, s)| {
                        let e: f64 = StandardNormal.sample(&mut rng);
                        m + s * e
                    })
                    .collect()
            })
            .collect();

        Ok(PosteriorDraws::from_unconstrained(self.method(), model, &[samples])
            .with_stat("loss", vec![losses]))
    }
}
