//! REML estimation of a random-intercept mixed model for one population.
//!
//! Fits `y = Xβ + Zu + ε` with `u ~ N(0, τ²I)` and `ε ~ N(0, σ²I)`, where X
//! is `[intercept, response]` and Z groups observations by subject. REML
//! (Restricted Maximum Likelihood) gives unbiased variance component
//! estimates with the small cohorts typical of clinical data.

use crate::data::LmmConfig;
use nalgebra::{DMatrix, DVector};

/// Fixed-effect estimates for the response coefficient, with fit diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct LmmFit {
    /// Response coefficient on the logit scale.
    pub estimate: f64,
    /// Standard error of the response coefficient.
    pub std_error: f64,
    /// Subject-level (random intercept) variance.
    pub tau2: f64,
    /// Residual variance.
    pub sigma2: f64,
    /// Residual degrees of freedom.
    pub df_residual: f64,
    /// Iterations used.
    pub iterations: usize,
    /// Whether REML estimation converged.
    pub converged: bool,
}

/// Logit transform with a boundary nudge.
///
/// Proportions of exactly 0 or 1 are pulled into the open interval by
/// `epsilon` so the transform stays finite.
pub fn logit_with_epsilon(p: f64, epsilon: f64) -> f64 {
    ((p + epsilon) / (1.0 - p + epsilon)).ln()
}

/// Fit the random-intercept model for one population.
///
/// `y` holds logit proportions, `response` the 0/1 encoded predictor, and
/// `subject_idx` maps each observation to a subject in `0..n_subjects`.
pub(crate) fn fit_random_intercept(
    y: &[f64],
    response: &[f64],
    subject_idx: &[usize],
    n_subjects: usize,
    config: &LmmConfig,
) -> LmmFit {
    let n = y.len();
    let p = 2;
    let y_vec = DVector::from_column_slice(y);

    // X = [1, response], Z = subject indicators
    let x = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { response[i] });
    let z = DMatrix::from_fn(n, n_subjects, |i, j| {
        if subject_idx[i] == j {
            1.0
        } else {
            0.0
        }
    });
    let zzt = &z * z.transpose();

    let (mut sigma2, mut tau2) = initialize_variance_components(&y_vec, &x, config);

    let mut log_reml_prev = f64::NEG_INFINITY;
    let mut param_delta = f64::INFINITY;
    let mut iterations = 0;

    for iter in 0..config.max_iter {
        iterations = iter + 1;

        let v = build_v_matrix(n, sigma2, tau2, &zzt, config.ridge);
        let v_chol = match v.clone().cholesky() {
            Some(c) => c,
            None => {
                let v_ridge = &v + DMatrix::identity(n, n) * 0.01;
                match v_ridge.cholesky() {
                    Some(c) => c,
                    None => return fit_ols_fallback(&y_vec, &x),
                }
            }
        };

        let v_inv_x = v_chol.solve(&x);
        let v_inv_y = v_chol.solve(&y_vec);

        let xtvinvx = x.transpose() * &v_inv_x;
        let xtvinvx_inv = match xtvinvx.clone().try_inverse() {
            Some(inv) => inv,
            None => {
                let ridged = &xtvinvx + DMatrix::identity(p, p) * config.ridge;
                match ridged.try_inverse() {
                    Some(inv) => inv,
                    None => return fit_ols_fallback(&y_vec, &x),
                }
            }
        };

        // GLS estimates: beta = (X'V^-1 X)^-1 X'V^-1 y
        let beta = &xtvinvx_inv * (x.transpose() * &v_inv_y);
        let residuals = &y_vec - &x * &beta;
        let v_inv_r = v_chol.solve(&residuals);

        // REML log-likelihood up to a constant:
        // -0.5 * (log|V| + log|X'V^-1 X| + r'V^-1 r)
        let log_det_v = 2.0 * v_chol.l().diagonal().map(|d| d.ln()).sum();
        let log_det_xtvinvx = match xtvinvx.clone().cholesky() {
            Some(c) => 2.0 * c.l().diagonal().map(|d| d.ln()).sum(),
            None => p as f64 * xtvinvx[(0, 0)].ln(),
        };
        let quad_form = residuals.dot(&v_inv_r);
        let log_reml = -0.5 * (log_det_v + log_det_xtvinvx + quad_form);

        let converged =
            (log_reml - log_reml_prev).abs() < config.tol || param_delta < config.tol;
        log_reml_prev = log_reml;

        if converged {
            let std_error = xtvinvx_inv[(1, 1)].max(0.0).sqrt();
            return LmmFit {
                estimate: beta[1],
                std_error,
                tau2,
                sigma2,
                df_residual: (n - p) as f64,
                iterations,
                converged: true,
            };
        }

        let (new_tau2, new_sigma2) =
            update_variance_components(&z, &residuals, &v_inv_r, sigma2, tau2, n, p, n_subjects, config);
        param_delta = (new_tau2 - tau2).abs() + (new_sigma2 - sigma2).abs();
        tau2 = new_tau2;
        sigma2 = new_sigma2;
    }

    // Did not converge: report the last GLS estimates with the flag down.
    let v = build_v_matrix(n, sigma2, tau2, &zzt, config.ridge);
    let v_chol = match v.clone().cholesky() {
        Some(c) => c,
        None => return fit_ols_fallback(&y_vec, &x),
    };
    let v_inv_x = v_chol.solve(&x);
    let v_inv_y = v_chol.solve(&y_vec);
    let xtvinvx = x.transpose() * &v_inv_x;
    let xtvinvx_inv = match (xtvinvx + DMatrix::identity(p, p) * config.ridge).try_inverse() {
        Some(inv) => inv,
        None => return fit_ols_fallback(&y_vec, &x),
    };
    let beta = &xtvinvx_inv * (x.transpose() * &v_inv_y);

    LmmFit {
        estimate: beta[1],
        std_error: xtvinvx_inv[(1, 1)].max(0.0).sqrt(),
        tau2,
        sigma2,
        df_residual: (n - p) as f64,
        iterations,
        converged: false,
    }
}

/// Build V = sigma2*I + tau2*ZZ'.
fn build_v_matrix(
    n: usize,
    sigma2: f64,
    tau2: f64,
    zzt: &DMatrix<f64>,
    ridge: f64,
) -> DMatrix<f64> {
    let mut v = zzt * tau2;
    for i in 0..n {
        v[(i, i)] += sigma2 + ridge;
    }
    v
}

/// Initialize variance components from OLS residuals.
fn initialize_variance_components(
    y: &DVector<f64>,
    x: &DMatrix<f64>,
    config: &LmmConfig,
) -> (f64, f64) {
    let n = y.len();
    let p = x.ncols();

    let xtx = x.transpose() * x;
    let xtx_inv = match xtx.clone().try_inverse() {
        Some(inv) => inv,
        None => {
            let ridged = &xtx + DMatrix::identity(p, p) * config.ridge.max(1e-8);
            match ridged.try_inverse() {
                Some(inv) => inv,
                None => return (config.var_lower_bound, config.var_lower_bound),
            }
        }
    };
    let beta_ols = &xtx_inv * (x.transpose() * y);
    let residuals = y - x * beta_ols;
    let rss: f64 = residuals.iter().map(|r| r * r).sum();

    let df = (n - p).max(1);
    let sigma2 = (rss / df as f64).max(config.var_lower_bound);
    let tau2 = (0.1 * sigma2).max(config.var_lower_bound);

    (sigma2, tau2)
}

/// Damped moment-based REML update of (tau2, sigma2).
#[allow(clippy::too_many_arguments)]
fn update_variance_components(
    z: &DMatrix<f64>,
    residuals: &DVector<f64>,
    v_inv_r: &DVector<f64>,
    sigma2: f64,
    tau2: f64,
    n: usize,
    p: usize,
    n_subjects: usize,
    config: &LmmConfig,
) -> (f64, f64) {
    let r_vinv_r = residuals.dot(v_inv_r);
    let new_sigma2 = (r_vinv_r / (n - p) as f64).max(config.var_lower_bound);

    // Between-subject variance from the projected residuals
    let ztr = z.transpose() * v_inv_r;
    let ss_between: f64 = ztr.iter().map(|v| v * v).sum();
    let new_tau2 = (ss_between / n_subjects as f64).max(config.var_lower_bound);

    // Damped update to prevent oscillation
    let alpha = 0.5;
    (
        (alpha * new_tau2 + (1.0 - alpha) * tau2).max(config.var_lower_bound),
        (alpha * new_sigma2 + (1.0 - alpha) * sigma2).max(config.var_lower_bound),
    )
}

/// OLS solution used when the mixed-model system is numerically unusable.
/// Always reported as non-convergent.
fn fit_ols_fallback(y: &DVector<f64>, x: &DMatrix<f64>) -> LmmFit {
    let n = y.len();
    let p = x.ncols();

    let xtx = x.transpose() * x;
    let xtx_inv = match xtx.clone().try_inverse() {
        Some(inv) => inv,
        None => {
            let ridged = &xtx + DMatrix::identity(p, p) * 1e-6;
            match ridged.try_inverse() {
                Some(inv) => inv,
                None => {
                    return LmmFit {
                        estimate: f64::NAN,
                        std_error: f64::NAN,
                        tau2: 0.0,
                        sigma2: f64::NAN,
                        df_residual: (n.saturating_sub(p)) as f64,
                        iterations: 0,
                        converged: false,
                    }
                }
            }
        }
    };

    let beta = &xtx_inv * (x.transpose() * y);
    let residuals = y - x * &beta;
    let rss: f64 = residuals.iter().map(|r| r * r).sum();
    let df = (n - p).max(1);
    let sigma2 = rss / df as f64;

    LmmFit {
        estimate: beta[1],
        std_error: (sigma2 * xtx_inv[(1, 1)]).max(0.0).sqrt(),
        tau2: 0.0,
        sigma2,
        df_residual: df as f64,
        iterations: 0,
        converged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_logit_with_epsilon_midpoint() {
        assert_relative_eq!(logit_with_epsilon(0.5, 1e-6), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_logit_with_epsilon_finite_at_boundaries() {
        let eps = 1e-6;
        assert!(logit_with_epsilon(0.0, eps).is_finite());
        assert!(logit_with_epsilon(1.0, eps).is_finite());
        assert!(logit_with_epsilon(0.0, eps) < -10.0);
        assert!(logit_with_epsilon(1.0, eps) > 10.0);
    }

    #[test]
    fn test_logit_matches_reference_formula() {
        let eps = 1e-6;
        for &p in &[0.25_f64, 0.75] {
            let expected = ((p + eps) / (1.0 - p + eps)).ln();
            assert_relative_eq!(logit_with_epsilon(p, eps), expected, epsilon = 0.0);
        }
    }

    // 4 subjects, 2 observations each, strong group separation
    fn separated_data() -> (Vec<f64>, Vec<f64>, Vec<usize>) {
        let y = vec![-2.0, -1.9, -2.1, -2.0, 0.9, 1.0, 1.1, 1.0];
        let response = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let subject_idx = vec![0, 0, 1, 1, 2, 2, 3, 3];
        (y, response, subject_idx)
    }

    #[test]
    fn test_fit_recovers_group_difference() {
        let (y, response, subject_idx) = separated_data();
        let fit = fit_random_intercept(&y, &response, &subject_idx, 4, &LmmConfig::default());

        assert!(fit.converged, "fit should converge on clean data");
        // True difference is 3.0
        assert!(
            (fit.estimate - 3.0).abs() < 0.2,
            "estimate {} should be near 3.0",
            fit.estimate
        );
        assert!(fit.std_error > 0.0);
        assert!(fit.tau2 >= 0.0 && fit.sigma2 > 0.0);
    }

    #[test]
    fn test_fit_no_effect_small_estimate() {
        let y = vec![0.1, 0.12, 0.09, 0.11, 0.1, 0.13, 0.08, 0.12];
        let response = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let subject_idx = vec![0, 0, 1, 1, 2, 2, 3, 3];

        let fit = fit_random_intercept(&y, &response, &subject_idx, 4, &LmmConfig::default());

        assert!(fit.estimate.abs() < 0.5);
    }

    #[test]
    fn test_fit_deterministic() {
        let (y, response, subject_idx) = separated_data();
        let config = LmmConfig::default();

        let a = fit_random_intercept(&y, &response, &subject_idx, 4, &config);
        let b = fit_random_intercept(&y, &response, &subject_idx, 4, &config);

        assert_eq!(a.estimate.to_bits(), b.estimate.to_bits());
        assert_eq!(a.std_error.to_bits(), b.std_error.to_bits());
        assert_eq!(a.iterations, b.iterations);
    }
}
