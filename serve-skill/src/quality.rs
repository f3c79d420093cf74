//! How closely each backend's posterior matches a reference backend's.

use crate::backends::PosteriorDraws;
use crate::experiment_config::BackendRun;
use serde::{Deserialize, Serialize};

/// The method whose draws the others are measured against.
pub const REFERENCE_METHOD: &str = "nuts";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QualityReport {
    pub method: String,
    pub reference: String,
    /// Root mean squared difference of posterior means over all elements.
    pub rmse_mean: f64,
    /// Root mean squared difference of posterior standard deviations.
    pub rmse_sd: f64,
    pub max_abs_mean_error: f64,
}

/// Compares every element of every variable the two runs share.
pub fn compare(
    label: &str,
    draws: &PosteriorDraws,
    reference_label: &str,
    reference: &PosteriorDraws,
) -> QualityReport {
    let (mut count, mut sq_mean, mut sq_sd, mut max_abs) = (0usize, 0., 0., 0f64);
    for name in reference.posterior.keys() {
        let expected = reference.element_summaries(name);
        let actual = draws.element_summaries(name);
        for ((ref_mean, ref_sd), (mean, sd)) in expected.into_iter().zip(actual) {
            let mean_err = mean - ref_mean;
            count += 1;
            sq_mean += mean_err * mean_err;
            sq_sd += (sd - ref_sd) * (sd - ref_sd);
            max_abs = max_abs.max(mean_err.abs());
        }
    }
    let n = count.max(1) as f64;
    QualityReport {
        method: label.to_string(),
        reference: reference_label.to_string(),
        rmse_mean: (sq_mean / n).sqrt(),
        rmse_sd: (sq_sd / n).sqrt(),
        max_abs_mean_error: max_abs,
    }
}

/// One row per run, in run order, or `None` when no run used the reference method.
pub fn quality_table(runs: &[BackendRun]) -> Option<Vec<QualityReport>> {
    let reference = runs
        .iter()
        .find(|run| run.draws.method == REFERENCE_METHOD)?;
    Some(
        runs.iter()
            .map(|run| compare(&run.label, &run.draws, &reference.label, &reference.draws))
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    fn draws(method: &str, values: &[f64]) -> PosteriorDraws {
        let chain = values.iter().map(|&v| vec![v, 2. * v]).collect();
        PosteriorDraws {
            method: method.into(),
            n_chains: 1,
            n_draws: values.len(),
            posterior: BTreeMap::from([("server_skills".to_string(), vec![chain])]),
            sample_stats: BTreeMap::new(),
        }
    }

    fn run(label: &str, draws: PosteriorDraws) -> BackendRun {
        BackendRun {
            label: label.into(),
            draws,
            secs_elapsed: 1.,
        }
    }

    #[test]
    fn test_compare_against_itself_is_zero() {
        let d = draws("nuts", &[1., 2., 3.]);
        let report = compare("nuts", &d, "nuts", &d);
        assert_eq!(report.rmse_mean, 0.);
        assert_eq!(report.rmse_sd, 0.);
        assert_eq!(report.max_abs_mean_error, 0.);
    }

    #[test]
    fn test_shifted_means() {
        let reference = draws("nuts", &[1., 2., 3.]);
        let shifted = draws("advi", &[2., 3., 4.]);
        let report = compare("advi", &shifted, "nuts", &reference);
        // Elements shift by 1 and 2 with equal spreads
        assert!((report.rmse_mean - 2.5f64.sqrt()).abs() < 1e-12);
        assert!(report.rmse_sd.abs() < 1e-12);
        assert!((report.max_abs_mean_error - 2.).abs() < 1e-12);
    }

    #[test]
    fn test_table_needs_reference() {
        let runs = vec![run("advi", draws("advi", &[0., 1.]))];
        assert!(quality_table(&runs).is_none());

        let runs = vec![
            run("dadvi", draws("dadvi", &[0., 1.])),
            run("nuts", draws("nuts", &[0., 1.])),
        ];
        let table = quality_table(&runs).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].method, "dadvi");
        assert_eq!(table[0].reference, "nuts");
    }
}
