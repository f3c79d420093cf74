//! Warmup adaptation for NUTS: dual-averaging step size and a diagonal mass
//! matrix estimated over doubling windows.

/// Nesterov dual averaging, Stan's parameterisation.
pub struct DualAveraging {
    target_accept: f64,
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    step: usize,
}

const GAMMA: f64 = 0.05;
const T0: f64 = 10.;
const KAPPA: f64 = 0.75;

impl DualAveraging {
    pub fn new(target_accept: f64, init_eps: f64) -> Self {
        let log_eps = init_eps.ln();
        Self {
            target_accept,
            mu: (10. * init_eps).ln(),
            log_eps,
            log_eps_bar: log_eps,
            h_bar: 0.,
            step: 0,
        }
    }

    pub fn update(&mut self, accept_prob: f64) {
        self.step += 1;
        let m = self.step as f64;
        let w = (m + T0).recip();
        self.h_bar = (1. - w) * self.h_bar + w * (self.target_accept - accept_prob);
        self.log_eps = self.mu - m.sqrt() / GAMMA * self.h_bar;
        let m_kappa = m.powf(-KAPPA);
        self.log_eps_bar = m_kappa * self.log_eps + (1. - m_kappa) * self.log_eps_bar;
    }

    pub fn step_size(&self) -> f64 {
        self.log_eps.exp()
    }

    /// The smoothed step size, used once warmup ends.
    pub fn final_step_size(&self) -> f64 {
        self.log_eps_bar.exp()
    }

    pub fn restart(&mut self, init_eps: f64) {
        *self = Self::new(self.target_accept, init_eps);
    }
}

/// Welford's online variance.
pub struct RunningVariance {
    mean: Vec<f64>,
    m2: Vec<f64>,
    count: usize,
}

impl RunningVariance {
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.; dim],
            m2: vec![0.; dim],
            count: 0,
        }
    }

    pub fn push(&mut self, x: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &xi) in self.mean.iter_mut().zip(&mut self.m2).zip(x) {
            let delta = xi - *mean;
            *mean += delta / n;
            *m2 += delta * (xi - *mean);
        }
    }

    /// Variance shrunk towards 1e-3 as Stan does, so short windows stay sane.
    pub fn regularized_variance(&self) -> Vec<f64> {
        let n = self.count as f64;
        if self.count < 2 {
            return vec![1.; self.mean.len()];
        }
        self.m2
            .iter()
            .map(|&m2| (n / (n + 5.)) * m2 / (n - 1.) + 1e-3 * (5. / (n + 5.)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.mean.fill(0.);
        self.m2.fill(0.);
        self.count = 0;
    }
}

/// Splits `n_warmup` iterations into an initial fast window, doubling slow
/// windows where the mass matrix is estimated, and a terminal fast window.
pub fn warmup_windows(n_warmup: usize) -> Vec<(usize, usize)> {
    if n_warmup < 20 {
        return vec![(0, n_warmup)];
    }
    let init_buffer = 75.min(n_warmup * 15 / 100);
    let term_buffer = 50.min(n_warmup / 10);
    let slow_end = n_warmup - term_buffer;

    let mut windows = vec![(0, init_buffer)];
    let mut start = init_buffer;
    let mut size = 25;
    while start < slow_end {
        let mut end = (start + size).min(slow_end);
        // Absorb a trailing window that would be less than twice as long
        if slow_end - end < 2 * size {
            end = slow_end;
        }
        windows.push((start, end));
        start = end;
        size *= 2;
    }
    windows.push((slow_end, n_warmup));
    windows
}

pub struct WindowedAdaptation {
    step_size: DualAveraging,
    variance: RunningVariance,
    windows: Vec<(usize, usize)>,
    window: usize,
    inv_mass: Vec<f64>,
}

impl WindowedAdaptation {
    pub fn new(dim: usize, n_warmup: usize, target_accept: f64, init_eps: f64) -> Self {
        Self {
            step_size: DualAveraging::new(target_accept, init_eps),
            variance: RunningVariance::new(dim),
            windows: warmup_windows(n_warmup),
            window: 0,
            inv_mass: vec![1.; dim],
        }
    }

    fn in_slow_window(&self) -> bool {
        self.window > 0 && self.window + 1 < self.windows.len()
    }

    /// Feeds one warmup transition. Returns true when the mass matrix changed,
    /// in which case the caller should search for a fresh step size and
    /// pass it to `restart_step_size`.
    pub fn update(&mut self, iter: usize, q: &[f64], accept_prob: f64) -> bool {
        self.step_size.update(accept_prob);
        let Some(&(_, end)) = self.windows.get(self.window) else {
            return false;
        };

        let slow = self.in_slow_window();
        if slow {
            self.variance.push(q);
        }
        if iter + 1 < end {
            return false;
        }

        self.window += 1;
        if slow {
            // Variance is in unconstrained units; the inverse mass is the variance itself
            self.inv_mass = self.variance.regularized_variance();
            self.variance.reset();
            return true;
        }
        false
    }

    pub fn restart_step_size(&mut self, eps: f64) {
        self.step_size.restart(eps);
    }

    pub fn step_size(&self) -> f64 {
        self.step_size.step_size()
    }

    pub fn final_step_size(&self) -> f64 {
        self.step_size.final_step_size()
    }

    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }
}
