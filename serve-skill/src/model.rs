//! The hierarchical serve/return skill model.
//!
//! Every match contributes two Binomial observations, one per server, so the
//! likelihood only sees serve-point efficiency and never who won the match:
//!
//! ```text
//! server_sd, returner_sd ~ HalfNormal(1)
//! server_skills[p]       ~ Normal(0, server_sd)
//! returner_skills[p]     ~ Normal(0, returner_sd)
//! serve_intercept        ~ Normal(0, 1)
//! points_won[j]          ~ Binomial(points_total[j],
//!                              logit = server_skills[s_j] - returner_skills[r_j] + serve_intercept)
//! ```
//!
//! Backends work in the unconstrained space
//! `[ln server_sd, ln returner_sd, server_skills.., returner_skills.., serve_intercept]`.

use crate::data_processing::ServeMatch;
use crate::encoder::PlayerEncoder;
use crate::numerical::{half_normal_lpdf, ln_binomial, log_sigmoid, normal_lpdf, sigmoid};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observation arrays, two entries per match: all winner-serving entries in
/// match order, followed by all loser-serving entries in the same order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observations {
    pub server_ids: Vec<usize>,
    pub returner_ids: Vec<usize>,
    pub points_won: Vec<u32>,
    pub points_total: Vec<u32>,
}

impl Observations {
    pub fn from_matches(matches: &[ServeMatch], encoder: &PlayerEncoder) -> Result<Self> {
        let winners = matches
            .iter()
            .map(|m| encoder.transform(&m.winner_name))
            .collect::<Result<Vec<_>>>()?;
        let losers = matches
            .iter()
            .map(|m| encoder.transform(&m.loser_name))
            .collect::<Result<Vec<_>>>()?;

        let server_ids = [winners.as_slice(), losers.as_slice()].concat();
        let returner_ids = [losers.as_slice(), winners.as_slice()].concat();
        let points_won = matches
            .iter()
            .map(|m| m.winner.svpt_won)
            .chain(matches.iter().map(|m| m.loser.svpt_won))
            .collect();
        let points_total = matches
            .iter()
            .map(|m| m.winner.svpt)
            .chain(matches.iter().map(|m| m.loser.svpt))
            .collect();

        Ok(Self {
            server_ids,
            returner_ids,
            points_won,
            points_total,
        })
    }

    pub fn len(&self) -> usize {
        self.server_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.server_ids.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    pub server_sd_scale: f64,
    pub returner_sd_scale: f64,
    pub intercept_sd: f64,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            server_sd_scale: 1.0,
            returner_sd_scale: 1.0,
            intercept_sd: 1.0,
        }
    }
}

/// Parameters mapped back to their natural (constrained) scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    pub server_sd: f64,
    pub returner_sd: f64,
    pub server_skills: Vec<f64>,
    pub returner_skills: Vec<f64>,
    pub serve_intercept: f64,
}

impl Parameters {
    /// Named variables in a fixed order, scalars as length-one slices.
    pub fn variables(&self) -> [(&'static str, &[f64]); 5] {
        [
            ("server_sd", std::slice::from_ref(&self.server_sd)),
            ("returner_sd", std::slice::from_ref(&self.returner_sd)),
            ("server_skills", &self.server_skills),
            ("returner_skills", &self.returner_skills),
            ("serve_intercept", std::slice::from_ref(&self.serve_intercept)),
        ]
    }
}

const SERVER_SD: usize = 0;
const RETURNER_SD: usize = 1;
const SKILLS_START: usize = 2;

/// Immutable once built; backends only ever get a shared reference.
#[derive(Clone, Debug, PartialEq)]
pub struct ServeSkillModel {
    n_players: usize,
    observations: Observations,
    priors: Priors,
    log_binomial_const: f64,
}

impl ServeSkillModel {
    pub fn new(n_players: usize, observations: Observations, priors: Priors) -> Result<Self> {
        let n_obs = observations.len();
        if [
            observations.returner_ids.len(),
            observations.points_won.len(),
            observations.points_total.len(),
        ]
        .iter()
        .any(|&len| len != n_obs)
        {
            return Err(Error::Parse("observation arrays differ in length".into()));
        }
        let mut ids = observations.server_ids.iter().chain(&observations.returner_ids);
        if let Some(&bad) = ids.find(|&&id| id >= n_players) {
            return Err(Error::UnknownPlayerId(bad));
        }
        let mut log_binomial_const = 0.;
        for (&k, &n) in observations.points_won.iter().zip(&observations.points_total) {
            if k > n {
                return Err(Error::Parse(format!("{} points won out of {}", k, n)));
            }
            log_binomial_const += ln_binomial(n, k);
        }

        Ok(Self {
            n_players,
            observations,
            priors,
            log_binomial_const,
        })
    }

    pub fn build(matches: &[ServeMatch], encoder: &PlayerEncoder) -> Result<Self> {
        let observations = Observations::from_matches(matches, encoder)?;
        let model = Self::new(encoder.len(), observations, Priors::default())?;
        tracing::info!(
            "Built model with {} players, {} observations, {} parameters",
            model.n_players,
            model.observations.len(),
            model.dim()
        );
        Ok(model)
    }

    pub fn n_players(&self) -> usize {
        self.n_players
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    /// Dimension of the unconstrained parameter vector.
    pub fn dim(&self) -> usize {
        2 * self.n_players + 3
    }

    fn returner_start(&self) -> usize {
        SKILLS_START + self.n_players
    }

    fn intercept_index(&self) -> usize {
        SKILLS_START + 2 * self.n_players
    }

    pub fn initial_point(&self) -> Vec<f64> {
        vec![0.; self.dim()]
    }

    pub fn constrain(&self, z: &[f64]) -> Parameters {
        debug_assert_eq!(z.len(), self.dim());
        let ret = self.returner_start();
        Parameters {
            server_sd: z[SERVER_SD].exp(),
            returner_sd: z[RETURNER_SD].exp(),
            server_skills: z[SKILLS_START..ret].to_vec(),
            returner_skills: z[ret..self.intercept_index()].to_vec(),
            serve_intercept: z[self.intercept_index()],
        }
    }

    pub fn log_density(&self, z: &[f64]) -> f64 {
        let mut grad = vec![0.; self.dim()];
        self.log_density_and_gradient(z, &mut grad)
    }

    /// Unnormalized log posterior in unconstrained space, including the
    /// log-Jacobian of the `exp` transform on the two scales. Overwrites `grad`.
    pub fn log_density_and_gradient(&self, z: &[f64], grad: &mut [f64]) -> f64 {
        debug_assert_eq!(z.len(), self.dim());
        debug_assert_eq!(grad.len(), self.dim());
        grad.fill(0.);

        let ret = self.returner_start();
        let icpt = self.intercept_index();
        let mut lp = self.log_binomial_const;

        // Hierarchical scales and the skills they govern
        for (sd_index, skills, prior_scale) in [
            (SERVER_SD, SKILLS_START..ret, self.priors.server_sd_scale),
            (RETURNER_SD, ret..icpt, self.priors.returner_sd_scale),
        ] {
            let log_sd = z[sd_index];
            let sd = log_sd.exp();
            lp += half_normal_lpdf(sd, prior_scale) + log_sd;
            grad[sd_index] += 1. - sd * sd / (prior_scale * prior_scale);

            let inv_var = (sd * sd).recip();
            for i in skills {
                let x = z[i];
                lp += normal_lpdf(x, 0., sd);
                grad[i] -= x * inv_var;
                grad[sd_index] += x * x * inv_var - 1.;
            }
        }

        let intercept = z[icpt];
        lp += normal_lpdf(intercept, 0., self.priors.intercept_sd);
        grad[icpt] -= intercept / (self.priors.intercept_sd * self.priors.intercept_sd);

        let obs = &self.observations;
        for j in 0..obs.len() {
            let s = SKILLS_START + obs.server_ids[j];
            let r = ret + obs.returner_ids[j];
            let eta = z[s] - z[r] + intercept;
            let k = obs.points_won[j] as f64;
            let n = obs.points_total[j] as f64;
            lp += k * log_sigmoid(eta) + (n - k) * log_sigmoid(-eta);

            let g = k - n * sigmoid(eta);
            grad[s] += g;
            grad[r] -= g;
            grad[icpt] += g;
        }

        lp
    }
}
