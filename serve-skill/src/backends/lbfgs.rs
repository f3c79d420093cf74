//! Unbounded L-BFGS with an Armijo backtracking line search.

use crate::numerical::dot;
use crate::{Error, Result};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub struct LbfgsConfig {
    pub max_iter: usize,
    /// Stop once the gradient's infinity norm falls below this.
    pub grad_tol: f64,
    /// Stop once the relative decrease of the objective falls below this.
    pub rel_tol: f64,
    /// Number of (s, y) pairs kept.
    pub memory: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            grad_tol: 1e-6,
            rel_tol: 1e-10,
            memory: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fval: f64,
    pub iterations: usize,
    pub n_evals: usize,
    pub converged: bool,
    /// Objective value after each accepted step, starting with the initial point.
    pub trace: Vec<f64>,
}

struct Pair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Two-loop recursion: returns `-H g` for the implicit inverse Hessian `H`.
fn direction(history: &VecDeque<Pair>, grad: &[f64]) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alpha = vec![0.; history.len()];
    for (i, pair) in history.iter().enumerate().rev() {
        alpha[i] = pair.rho * dot(&pair.s, &q);
        for (qj, yj) in q.iter_mut().zip(&pair.y) {
            *qj -= alpha[i] * yj;
        }
    }

    let gamma = history.back().map_or(1., |last| {
        let yy = dot(&last.y, &last.y);
        if yy > 1e-30 { dot(&last.s, &last.y) / yy } else { 1. }
    });
    let mut r: Vec<f64> = q.iter().map(|qi| gamma * qi).collect();

    for (pair, a) in history.iter().zip(&alpha) {
        let beta = pair.rho * dot(&pair.y, &r);
        for (rj, sj) in r.iter_mut().zip(&pair.s) {
            *rj += (a - beta) * sj;
        }
    }
    r.iter_mut().for_each(|v| *v = -*v);
    r
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0., |acc: f64, x| acc.max(x.abs()))
}

/// Minimizes `objective`, which must write the gradient into its second
/// argument and return the function value.
pub fn minimize<F>(mut objective: F, x0: Vec<f64>, config: &LbfgsConfig) -> Result<Minimum>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    const ARMIJO_C: f64 = 1e-4;
    const MAX_BACKTRACKS: usize = 40;

    let n = x0.len();
    let mut x = x0;
    let mut grad = vec![0.; n];
    let mut fval = objective(&x, &mut grad);
    let mut n_evals = 1;
    if !fval.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return Err(Error::backend("lbfgs", "objective is not finite at the initial point"));
    }

    let mut history: VecDeque<Pair> = VecDeque::with_capacity(config.memory);
    let mut trace = vec![fval];
    let mut converged = inf_norm(&grad) < config.grad_tol;
    let mut iterations = 0;

    let mut x_next = vec![0.; n];
    let mut grad_next = vec![0.; n];
    while !converged && iterations < config.max_iter {
        let mut dir = direction(&history, &grad);
        let mut slope = dot(&grad, &dir);
        if slope.is_nan() || slope >= 0. {
            history.clear();
            dir = grad.iter().map(|g| -g).collect();
            slope = dot(&grad, &dir);
        }

        let mut step = 1.;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            for ((xn, xi), di) in x_next.iter_mut().zip(&x).zip(&dir) {
                *xn = xi + step * di;
            }
            let f = objective(&x_next, &mut grad_next);
            n_evals += 1;
            if f.is_finite() && f <= fval + ARMIJO_C * step * slope {
                accepted = Some(f);
                break;
            }
            step *= 0.5;
        }
        let Some(f_next) = accepted else {
            tracing::debug!("L-BFGS line search stalled after {} iterations", iterations);
            break;
        };
        iterations += 1;

        let s: Vec<f64> = x_next.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = grad_next.iter().zip(&grad).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == config.memory {
                history.pop_front();
            }
            history.push_back(Pair { s, y, rho: sy.recip() });
        }

        let rel_change = (fval - f_next).abs() / fval.abs().max(f_next.abs()).max(1.);
        std::mem::swap(&mut x, &mut x_next);
        std::mem::swap(&mut grad, &mut grad_next);
        fval = f_next;
        trace.push(fval);

        converged = inf_norm(&grad) < config.grad_tol || rel_change < config.rel_tol;
    }

    Ok(Minimum {
        x,
        fval,
        iterations,
        n_evals,
        converged,
        trace,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use claims::assert_err;

    fn rosenbrock(x: &[f64], grad: &mut [f64]) -> f64 {
        let (a, b) = (x[0], x[1]);
        grad[0] = -2. * (1. - a) - 400. * a * (b - a * a);
        grad[1] = 200. * (b - a * a);
        (1. - a).powi(2) + 100. * (b - a * a).powi(2)
    }

    #[test]
    fn test_quadratic() {
        let centre = [2., -3., 0.5];
        let result = minimize(
            |x, grad| {
                let mut f = 0.;
                for i in 0..3 {
                    let d = x[i] - centre[i];
                    let w = (i + 1) as f64;
                    grad[i] = 2. * w * d;
                    f += w * d * d;
                }
                f
            },
            vec![0.; 3],
            &LbfgsConfig::default(),
        )
        .unwrap();
        assert!(result.converged);
        for (x, c) in result.x.iter().zip(centre) {
            assert!((x - c).abs() < 1e-5);
        }
        assert!(result.trace.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_rosenbrock() {
        let result = minimize(rosenbrock, vec![-1.2, 1.], &LbfgsConfig::default()).unwrap();
        assert!((result.x[0] - 1.).abs() < 1e-3, "{:?}", result);
        assert!((result.x[1] - 1.).abs() < 1e-3, "{:?}", result);
    }

    #[test]
    fn test_every_step_descends() {
        let config = LbfgsConfig {
            memory: 1,
            max_iter: 200,
            ..LbfgsConfig::default()
        };
        let result = minimize(rosenbrock, vec![-1.2, 1.], &config).unwrap();
        assert!(result.iterations > 0);
        assert!(result.trace.windows(2).all(|w| w[1] <= w[0]), "{:?}", result.trace);
        assert!(result.fval < result.trace[0]);
    }

    #[test]
    fn test_non_finite_start() {
        assert_err!(minimize(
            |x, grad| {
                grad[0] = 1.;
                x[0].ln()
            },
            vec![-1.],
            &LbfgsConfig::default()
        ));
    }
}
