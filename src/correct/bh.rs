//! Benjamini-Hochberg false discovery rate correction.
//!
//! The correction is a batch-level operation: adjusted p-values depend on
//! the full set of usable raw p-values, so it runs only after every
//! per-population fit has completed.

use crate::data::{CorrectedModelResult, ModelResult, Significance};
use crate::error::{DaaError, Result};

/// Adjust a batch of p-values with the Benjamini-Hochberg procedure.
///
/// Sort ascending, assign rank i out of m, adjust to `p_i * m / i`, enforce
/// monotonicity with a running minimum from the largest rank down, and clip
/// to [0, 1]. Output order matches input order.
pub fn bh_adjust(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let m_f64 = m as f64;
    let mut adjusted_sorted = vec![0.0; m];
    adjusted_sorted[m - 1] = p_values[order[m - 1]].min(1.0);
    for i in (0..m - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[order[i]] * m_f64 / rank as f64;
        adjusted_sorted[i] = adjusted.min(adjusted_sorted[i + 1]).min(1.0);
    }

    let mut out = vec![0.0; m];
    for (i, &orig_idx) in order.iter().enumerate() {
        out[orig_idx] = adjusted_sorted[i];
    }
    out
}

/// Correct a batch of per-population results for multiple testing.
///
/// Exactly the usable results (converged fits with finite p-values) form the
/// correction set of size m; insufficient-data and non-convergent results are
/// carried through unadjusted as `NotTested` and contribute nothing to m.
/// The significance flag is `p_adj <= fdr_threshold`.
pub fn correct_for_multiple_testing(
    results: &[ModelResult],
    fdr_threshold: f64,
) -> Result<Vec<CorrectedModelResult>> {
    if !(fdr_threshold > 0.0 && fdr_threshold <= 1.0) {
        return Err(DaaError::InvalidParameter(format!(
            "FDR threshold must be in (0, 1], got {}",
            fdr_threshold
        )));
    }

    // Explicit usable-subset boundary between fitting and correction
    let usable: Vec<(usize, f64)> = results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.usable_p_value().map(|p| (i, p)))
        .collect();

    let p_values: Vec<f64> = usable.iter().map(|&(_, p)| p).collect();
    let adjusted = bh_adjust(&p_values);

    let mut p_adj_by_index: Vec<Option<f64>> = vec![None; results.len()];
    for (&(orig_idx, _), &q) in usable.iter().zip(&adjusted) {
        p_adj_by_index[orig_idx] = Some(q);
    }

    Ok(results
        .iter()
        .zip(p_adj_by_index)
        .map(|(model, p_adj)| {
            let significance = match p_adj {
                Some(q) if q <= fdr_threshold => Significance::Significant,
                Some(_) => Significance::NotSignificant,
                None => Significance::NotTested,
            };
            CorrectedModelResult {
                model: model.clone(),
                p_adj,
                significance,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FitStatus;
    use approx::assert_relative_eq;

    fn converged(population: &str, p_value: f64) -> ModelResult {
        ModelResult {
            population: population.to_string(),
            estimate: 0.5,
            std_error: 0.1,
            statistic: 5.0,
            p_value,
            status: FitStatus::Converged,
            n_samples: 12,
            n_subjects: 6,
        }
    }

    #[test]
    fn test_bh_known_values() {
        // 5 tests, p = [0.005, 0.01, 0.02, 0.04, 0.1]
        // Rank 1: 0.005 * 5/1 = 0.025
        // Rank 2: 0.01 * 5/2 = 0.025
        // Rank 3: 0.02 * 5/3 = 0.0333...
        // Rank 4: 0.04 * 5/4 = 0.05
        // Rank 5: 0.1 * 5/5 = 0.1
        let adjusted = bh_adjust(&[0.005, 0.01, 0.02, 0.04, 0.1]);

        assert_relative_eq!(adjusted[0], 0.025, epsilon = 1e-10);
        assert_relative_eq!(adjusted[1], 0.025, epsilon = 1e-10);
        assert_relative_eq!(adjusted[2], 1.0 / 30.0, epsilon = 1e-10);
        assert_relative_eq!(adjusted[3], 0.05, epsilon = 1e-10);
        assert_relative_eq!(adjusted[4], 0.1, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_all_equal_is_fixpoint() {
        let adjusted = bh_adjust(&[0.04; 5]);
        for &q in &adjusted {
            assert_relative_eq!(q, 0.04, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bh_unsorted_input_restored_to_original_order() {
        let adjusted = bh_adjust(&[0.04, 0.01, 0.03, 0.005]);

        // Smallest raw p (index 3) gets the smallest adjusted value
        assert_relative_eq!(adjusted[3], 0.02, epsilon = 1e-10);
        assert_relative_eq!(adjusted[1], 0.02, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_monotone_and_bounded() {
        let p_values = vec![0.001, 0.01, 0.02, 0.05, 0.5, 0.9];
        let adjusted = bh_adjust(&p_values);

        let mut prev = 0.0;
        for (&p, &q) in p_values.iter().zip(&adjusted) {
            assert!(q >= p - 1e-12, "adjusted {} below raw {}", q, p);
            assert!((0.0..=1.0).contains(&q));
            assert!(q >= prev - 1e-12);
            prev = q;
        }
    }

    #[test]
    fn test_bh_empty_and_single() {
        assert!(bh_adjust(&[]).is_empty());
        let single = bh_adjust(&[0.03]);
        assert_relative_eq!(single[0], 0.03, epsilon = 1e-12);
    }

    #[test]
    fn test_correction_flags_significance() {
        let results = vec![
            converged("b_cell", 0.001),
            converged("cd8_t_cell", 0.2),
            converged("nk_cell", 0.03),
        ];

        let corrected = correct_for_multiple_testing(&results, 0.05).unwrap();

        assert_eq!(corrected[0].significance, Significance::Significant);
        assert_eq!(corrected[1].significance, Significance::NotSignificant);
        assert!(corrected.iter().all(|c| c.tested()));
    }

    #[test]
    fn test_non_convergent_excluded_from_m() {
        let mut not_converged = converged("cd4_t_cell", 0.001);
        not_converged.status = FitStatus::NotConverged;
        not_converged.p_value = f64::NAN;

        let insufficient =
            ModelResult::insufficient("monocyte", "only one response level".to_string(), 2, 2);

        let results = vec![
            converged("b_cell", 0.01),
            not_converged,
            insufficient,
            converged("nk_cell", 0.02),
        ];

        let corrected = correct_for_multiple_testing(&results, 0.05).unwrap();

        // m = 2: adjusted = [0.01*2/1 min-run, 0.02*2/2] = [0.02, 0.02]
        assert_relative_eq!(corrected[0].p_adj.unwrap(), 0.02, epsilon = 1e-10);
        assert_relative_eq!(corrected[3].p_adj.unwrap(), 0.02, epsilon = 1e-10);
        assert_eq!(corrected[1].p_adj, None);
        assert_eq!(corrected[1].significance, Significance::NotTested);
        assert_eq!(corrected[2].p_adj, None);
        assert_eq!(corrected[2].significance, Significance::NotTested);
    }

    #[test]
    fn test_invalid_threshold_is_fatal() {
        let results = vec![converged("b_cell", 0.01)];
        assert!(correct_for_multiple_testing(&results, 0.0).is_err());
        assert!(correct_for_multiple_testing(&results, 1.5).is_err());
        assert!(correct_for_multiple_testing(&results, 1.0).is_ok());
    }

    #[test]
    fn test_threshold_boundary_is_significant() {
        // Single test: adjusted equals raw; p_adj <= threshold counts
        let results = vec![converged("b_cell", 0.05)];
        let corrected = correct_for_multiple_testing(&results, 0.05).unwrap();
        assert_eq!(corrected[0].significance, Significance::Significant);
    }
}
