//! No-U-Turn sampler with multinomial trajectory sampling and Stan-style
//! windowed warmup. Chains are independent and run on the rayon pool.

use super::adapt::WindowedAdaptation;
use super::{InferenceBackend, PosteriorDraws};
use crate::model::ServeSkillModel;
use crate::numerical::log_sum_exp;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

/// Energy error beyond which a trajectory is declared divergent.
const MAX_ENERGY_ERROR: f64 = 1000.;

#[derive(Clone, Debug, PartialEq)]
pub struct Nuts {
    pub tune: usize,
    pub draws: usize,
    pub chains: usize,
    pub target_accept: f64,
    pub max_treedepth: usize,
    pub seed: u64,
}

impl Default for Nuts {
    fn default() -> Self {
        Self {
            tune: 1000,
            draws: 1000,
            chains: 4,
            target_accept: 0.8,
            max_treedepth: 10,
            seed: 0,
        }
    }
}

/// A point in phase space with its cached log density and gradient.
#[derive(Clone)]
struct PhasePoint {
    q: Vec<f64>,
    p: Vec<f64>,
    logp: f64,
    grad: Vec<f64>,
}

impl PhasePoint {
    fn new(model: &ServeSkillModel, q: Vec<f64>) -> Self {
        let mut grad = vec![0.; q.len()];
        let logp = model.log_density_and_gradient(&q, &mut grad);
        Self {
            p: vec![0.; q.len()],
            q,
            logp,
            grad,
        }
    }

    fn hamiltonian(&self, inv_mass: &[f64]) -> f64 {
        let kinetic: f64 = self
            .p
            .iter()
            .zip(inv_mass)
            .map(|(&p, &m)| p * p * m)
            .sum();
        0.5 * kinetic - self.logp
    }

    fn leapfrog(&self, model: &ServeSkillModel, eps: f64, inv_mass: &[f64]) -> Self {
        let mut next = self.clone();
        for (p, &g) in next.p.iter_mut().zip(&self.grad) {
            *p += 0.5 * eps * g;
        }
        for ((q, &p), &m) in next.q.iter_mut().zip(&next.p).zip(inv_mass) {
            *q += eps * m * p;
        }
        next.logp = model.log_density_and_gradient(&next.q, &mut next.grad);
        for (p, &g) in next.p.iter_mut().zip(&next.grad) {
            *p += 0.5 * eps * g;
        }
        next
    }
}

struct Trajectory {
    left: PhasePoint,
    right: PhasePoint,
    proposal: PhasePoint,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept_prob: f64,
    divergent: bool,
    turning: bool,
}

fn is_turning(left: &PhasePoint, right: &PhasePoint, inv_mass: &[f64]) -> bool {
    let (mut dot_left, mut dot_right) = (0., 0.);
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * inv_mass[i] * left.p[i];
        dot_right += dq * inv_mass[i] * right.p[i];
    }
    dot_left < 0. || dot_right < 0.
}

struct TreeBuilder<'a, R> {
    model: &'a ServeSkillModel,
    eps: f64,
    inv_mass: &'a [f64],
    h0: f64,
    rng: &'a mut R,
}

impl<R: Rng> TreeBuilder<'_, R> {
    /// Builds a subtree of `2^depth` leapfrog steps starting past `edge`.
    fn build(&mut self, edge: &PhasePoint, depth: usize, forward: bool) -> Trajectory {
        if depth == 0 {
            let eps = if forward { self.eps } else { -self.eps };
            let point = edge.leapfrog(self.model, eps, self.inv_mass);
            let energy_error = point.hamiltonian(self.inv_mass) - self.h0;
            let (log_weight, accept_prob) = if energy_error.is_finite() {
                (-energy_error, (-energy_error).exp().min(1.))
            } else {
                (f64::NEG_INFINITY, 0.)
            };
            return Trajectory {
                left: point.clone(),
                right: point.clone(),
                proposal: point,
                log_sum_weight: log_weight,
                n_leapfrog: 1,
                sum_accept_prob: accept_prob,
                divergent: !energy_error.is_finite() || energy_error > MAX_ENERGY_ERROR,
                turning: false,
            };
        }

        let mut inner = self.build(edge, depth - 1, forward);
        if inner.divergent || inner.turning {
            return inner;
        }
        let next_edge = if forward { &inner.right } else { &inner.left };
        let outer = self.build(next_edge, depth - 1, forward);

        inner.n_leapfrog += outer.n_leapfrog;
        inner.sum_accept_prob += outer.sum_accept_prob;
        if outer.divergent || outer.turning {
            inner.divergent |= outer.divergent;
            inner.turning |= outer.turning;
            return inner;
        }

        // Uniform progressive sampling within a subtree
        let log_sum_weight = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
        if self.rng.random::<f64>() < (outer.log_sum_weight - log_sum_weight).exp() {
            inner.proposal = outer.proposal;
        }
        inner.log_sum_weight = log_sum_weight;
        if forward {
            inner.right = outer.right;
        } else {
            inner.left = outer.left;
        }
        inner.turning = is_turning(&inner.left, &inner.right, self.inv_mass);
        inner
    }
}

struct Transition {
    point: PhasePoint,
    depth: usize,
    n_leapfrog: usize,
    accept_prob: f64,
    divergent: bool,
}

fn transition(
    model: &ServeSkillModel,
    current: &PhasePoint,
    eps: f64,
    inv_mass: &[f64],
    max_treedepth: usize,
    rng: &mut impl Rng,
) -> Transition {
    let mut start = current.clone();
    for (p, &m) in start.p.iter_mut().zip(inv_mass) {
        let z: f64 = rng.sample(StandardNormal);
        *p = z / m.sqrt();
    }
    let h0 = start.hamiltonian(inv_mass);

    let mut tree = Trajectory {
        left: start.clone(),
        right: start.clone(),
        proposal: start,
        log_sum_weight: 0.,
        n_leapfrog: 0,
        sum_accept_prob: 0.,
        divergent: false,
        turning: false,
    };

    let mut depth = 0;
    while depth < max_treedepth {
        let forward = rng.random::<bool>();
        let edge = if forward { &tree.right } else { &tree.left };
        let subtree = TreeBuilder {
            model,
            eps,
            inv_mass,
            h0,
            rng: &mut *rng,
        }
        .build(edge, depth, forward);
        depth += 1;

        tree.n_leapfrog += subtree.n_leapfrog;
        tree.sum_accept_prob += subtree.sum_accept_prob;
        if subtree.divergent || subtree.turning {
            tree.divergent |= subtree.divergent;
            break;
        }

        // Biased progressive sampling favours the newer subtree
        if rng.random::<f64>() < (subtree.log_sum_weight - tree.log_sum_weight).exp() {
            tree.proposal = subtree.proposal;
        }
        tree.log_sum_weight = log_sum_exp(tree.log_sum_weight, subtree.log_sum_weight);
        if forward {
            tree.right = subtree.right;
        } else {
            tree.left = subtree.left;
        }
        if is_turning(&tree.left, &tree.right, inv_mass) {
            break;
        }
    }

    Transition {
        point: tree.proposal,
        depth,
        n_leapfrog: tree.n_leapfrog,
        accept_prob: tree.sum_accept_prob / tree.n_leapfrog.max(1) as f64,
        divergent: tree.divergent,
    }
}

/// Doubles or halves the step size until a single leapfrog step's
/// acceptance probability crosses 1/2.
fn find_reasonable_step_size(
    model: &ServeSkillModel,
    point: &PhasePoint,
    inv_mass: &[f64],
    rng: &mut impl Rng,
) -> f64 {
    let mut start = point.clone();
    for (p, &m) in start.p.iter_mut().zip(inv_mass) {
        let z: f64 = rng.sample(StandardNormal);
        *p = z / m.sqrt();
    }
    let h0 = start.hamiltonian(inv_mass);
    let log_accept = |eps: f64| {
        let h1 = start.leapfrog(model, eps, inv_mass).hamiltonian(inv_mass);
        if h1.is_finite() { h0 - h1 } else { f64::NEG_INFINITY }
    };

    let half = 0.5f64.ln();
    let mut eps = 1.;
    let grow = log_accept(eps) > half;
    for _ in 0..100 {
        let next = if grow { eps * 2. } else { eps * 0.5 };
        let next_ok = log_accept(next) > half;
        if grow && !next_ok {
            break;
        }
        eps = next;
        if !grow && next_ok {
            break;
        }
    }
    eps.clamp(1e-10, 1e3)
}

const SAMPLE_STATS: [&str; 6] = [
    "diverging",
    "tree_depth",
    "n_steps",
    "acceptance_rate",
    "lp",
    "step_size",
];

struct ChainOutput {
    draws: Vec<Vec<f64>>,
    /// One series per entry of `SAMPLE_STATS`.
    stats: [Vec<f64>; 6],
}

impl Nuts {
    fn run_chain(&self, model: &ServeSkillModel, chain: usize) -> Result<ChainOutput> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(chain as u64));

        // Jittered start around the initial point
        let q0 = model
            .initial_point()
            .into_iter()
            .map(|z| z + rng.random_range(-1.0..1.0))
            .collect();
        let mut point = PhasePoint::new(model, q0);
        if !point.logp.is_finite() {
            return Err(Error::backend("nuts", "initial log density is not finite"));
        }

        let init_eps = find_reasonable_step_size(model, &point, &vec![1.; model.dim()], &mut rng);
        let mut adaptation = WindowedAdaptation::new(model.dim(), self.tune, self.target_accept, init_eps);
        for iter in 0..self.tune {
            let inv_mass = adaptation.inv_mass().to_vec();
            let step = transition(
                model,
                &point,
                adaptation.step_size(),
                &inv_mass,
                self.max_treedepth,
                &mut rng,
            );
            point = step.point;
            if adaptation.update(iter, &point.q, step.accept_prob) {
                let eps = find_reasonable_step_size(model, &point, adaptation.inv_mass(), &mut rng);
                adaptation.restart_step_size(eps);
            }
        }

        let eps = adaptation.final_step_size();
        let inv_mass = adaptation.inv_mass().to_vec();
        tracing::debug!("Chain {} finished warmup with step size {:.4}", chain, eps);

        let mut out = ChainOutput {
            draws: Vec::with_capacity(self.draws),
            stats: Default::default(),
        };
        for _ in 0..self.draws {
            let step = transition(model, &point, eps, &inv_mass, self.max_treedepth, &mut rng);
            point = step.point;
            let values = [
                step.divergent as u8 as f64,
                step.depth as f64,
                step.n_leapfrog as f64,
                step.accept_prob,
                point.logp,
                eps,
            ];
            for (series, value) in out.stats.iter_mut().zip(values) {
                series.push(value);
            }
            out.draws.push(point.q.clone());
        }
        Ok(out)
    }
}

impl InferenceBackend for Nuts {
    fn method(&self) -> &'static str {
        "nuts"
    }

    fn fit(&self, model: &ServeSkillModel) -> Result<PosteriorDraws> {
        if self.chains == 0 || self.draws == 0 {
            return Err(Error::Config("nuts needs at least one chain and one draw".into()));
        }
        let chains = (0..self.chains)
            .into_par_iter()
            .map(|chain| self.run_chain(model, chain))
            .collect::<Result<Vec<_>>>()?;

        let divergences: f64 = chains.iter().flat_map(|c| &c.stats[0]).sum();
        if divergences > 0. {
            tracing::warn!("There were {} divergences after tuning", divergences);
        }
        let mean_accept = chains
            .iter()
            .flat_map(|c| &c.stats[3])
            .sum::<f64>()
            / (self.chains * self.draws) as f64;
        tracing::info!(
            "NUTS drew {} x {} samples, mean acceptance {:.3}",
            self.chains,
            self.draws,
            mean_accept
        );

        let unconstrained: Vec<_> = chains.iter().map(|c| c.draws.clone()).collect();
        let mut draws = PosteriorDraws::from_unconstrained(self.method(), model, &unconstrained);
        for (k, name) in SAMPLE_STATS.iter().enumerate() {
            draws = draws.with_stat(name, chains.iter().map(|c| c.stats[k].clone()).collect());
        }
        Ok(draws)
    }
}
