pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1. + ez)
    }
}

/// ln(1 + e^z) without overflow for large z.
pub fn softplus(z: f64) -> f64 {
    if z > 0. {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// ln(sigmoid(z)), stable in both tails.
pub fn log_sigmoid(z: f64) -> f64 {
    -softplus(-z)
}

pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

pub fn ln_binomial(n: u32, k: u32) -> f64 {
    statrs::function::factorial::ln_binomial(n as u64, k as u64)
}

pub fn normal_lpdf(x: f64, mu: f64, sig: f64) -> f64 {
    let z = (x - mu) / sig;
    -0.5 * z * z - sig.ln() - LN_SQRT_2PI
}

pub fn half_normal_lpdf(x: f64, sig: f64) -> f64 {
    std::f64::consts::LN_2 + normal_lpdf(x, 0., sig)
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sample mean and (n-1)-normalized standard deviation.
pub fn mean_and_sd(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let (count, sum) = values.clone().fold((0usize, 0.), |(c, s), v| (c + 1, s + v));
    if count == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = sum / count as f64;
    if count == 1 {
        return (mean, 0.);
    }
    let ss: f64 = values.map(|v| (v - mean) * (v - mean)).sum();
    (mean, (ss / (count - 1) as f64).sqrt())
}
