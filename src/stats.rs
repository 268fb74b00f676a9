// src/stats.rs

use crate::error::{Result, VqError};
use crate::kernel::MetricKind;
use serde::{Deserialize, Serialize};

/// Reported when no positive SSIMULACRA2 samples exist (or the reciprocal
/// denominator degenerates). Matches the scale floor used in reports.
pub const SSIMULACRA2_FLOOR: f64 = 0.0;

/// Peak sample value for 8-bit video, used by the W-XPSNR composite.
const XPSNR_MAXVAL: f64 = 255.0;

/// Summary statistics for one metric over one video pair.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AggregateStats {
    pub mean: f64,
    pub harmonic_mean: f64,
    pub std_dev: f64,
    pub p10: f64,
}

/// Reduce a collected sample into summary statistics. Pure function of
/// (metric kind, values); fails rather than producing a zero-valued aggregate
/// when the sample is empty.
pub fn aggregate(metric: MetricKind, values: &[f64]) -> Result<AggregateStats> {
    if values.is_empty() {
        return Err(VqError::EmptySample(metric.label()));
    }
    let mean = mean(values);
    Ok(AggregateStats {
        mean,
        harmonic_mean: adjusted_harmonic_mean(values),
        std_dev: std_dev(values, mean),
        p10: percentile(values, 0.10),
    })
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by N). N=1 yields exactly 0 instead
/// of a degenerate division.
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolation percentile over the sorted sample: rank (N-1)*q,
/// interpolated between the floor and ceil indices by fractional weight.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (sorted.len() - 1) as f64 * q;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Harmonic mean adjusted for mixed-sign samples. SSIMULACRA2 can score
/// below zero on severe degradation, where the classic harmonic mean is
/// undefined. Values are split into positives P and negatives N; the
/// denominator subtracts the (negative) reciprocals of N, so each negative
/// sample inflates the denominator in proportion to its magnitude and drags
/// the result toward the floor. Exact zeros join neither partition.
pub fn adjusted_harmonic_mean(values: &[f64]) -> f64 {
    let pos_reciprocals: f64 = values.iter().filter(|v| **v > 0.0).map(|v| 1.0 / v).sum();
    let neg_reciprocals: f64 = values.iter().filter(|v| **v < 0.0).map(|v| 1.0 / v).sum();
    let positive_count = values.iter().filter(|v| **v > 0.0).count();
    if positive_count == 0 {
        return SSIMULACRA2_FLOOR;
    }
    let denominator = pos_reciprocals - neg_reciprocals;
    if denominator <= 0.0 {
        return SSIMULACRA2_FLOOR;
    }
    positive_count as f64 / denominator
}

/// Worst single-frame value in the sample.
pub fn max_value(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Convert a Butteraugli distance into the 0-100 "video Butteraugli" scale
/// (higher is better), so it aggregates like SSIMULACRA2.
pub fn butter_to_vbutter(d: f64) -> f64 {
    let vb = if d == 0.0 {
        1.0
    } else {
        ((2.0 / (d.abs() + 2.0)) * 200.0).log10() - 1.30103
    };
    vb * 100.0
}

/// Convert PSNR (dB) back to MSE for the given peak sample value.
fn psnr_to_mse(p: f64, maxval: f64) -> f64 {
    (maxval * maxval) / 10f64.powf(p / 10.0)
}

/// Luma-weighted composite XPSNR from per-channel means. The channels are
/// combined in the MSE domain with fixed 4:1:1 weights, then converted back
/// to dB.
pub fn weighted_xpsnr(y: f64, u: f64, v: f64) -> f64 {
    let mse_y = psnr_to_mse(y, XPSNR_MAXVAL);
    let mse_u = psnr_to_mse(u, XPSNR_MAXVAL);
    let mse_v = psnr_to_mse(v, XPSNR_MAXVAL);
    let w_mse = (4.0 * mse_y + mse_u + mse_v) / 6.0;
    10.0 * ((XPSNR_MAXVAL * XPSNR_MAXVAL) / w_mse).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::MetricKind;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn mean_stddev_p10_scenario() {
        let values = [10.0, 20.0, 30.0];
        let stats = aggregate(MetricKind::Ssimulacra2, &values).unwrap();
        assert!(close(stats.mean, 20.0, 1e-12));
        assert!(close(stats.std_dev, (200.0f64 / 3.0).sqrt(), 1e-12));
        // rank (3-1)*0.10 = 0.2 between 10 and 20
        assert!(close(stats.p10, 12.0, 1e-12));
    }

    #[test]
    fn empty_sample_is_an_error() {
        assert!(matches!(
            aggregate(MetricKind::Ssimulacra2, &[]),
            Err(VqError::EmptySample(_))
        ));
    }

    #[test]
    fn constant_sample_has_zero_stddev() {
        let values = [42.0; 7];
        assert_eq!(std_dev(&values, mean(&values)), 0.0);
        assert_eq!(std_dev(&[5.0], 5.0), 0.0);
    }

    #[test]
    fn singleton_percentile_is_the_value() {
        assert_eq!(percentile(&[13.5], 0.10), 13.5);
    }

    #[test]
    fn positive_only_hmean_matches_classic() {
        let values = [60.0, 70.0, 80.0];
        let classic = 3.0 / (1.0 / 60.0 + 1.0 / 70.0 + 1.0 / 80.0);
        assert!(close(adjusted_harmonic_mean(&values), classic, 1e-12));
    }

    #[test]
    fn negative_values_amplify_the_penalty() {
        // Worked scenario: P={60,70}, N={-5},
        // D = 1/60 + 1/70 + 1/5, H = 2/D ~= 8.66
        let values = [60.0, 70.0, -5.0];
        let h = adjusted_harmonic_mean(&values);
        assert!(close(h, 2.0 / (1.0 / 60.0 + 1.0 / 70.0 + 0.2), 1e-12));
        assert!(close(h, 8.66, 0.01));
        assert!(h < mean(&values));

        // Adding more negatives of equal magnitude keeps shrinking it.
        let worse = [60.0, 70.0, -5.0, -5.0];
        assert!(adjusted_harmonic_mean(&worse) < h);
    }

    #[test]
    fn zeros_join_neither_partition() {
        // A zero contributes no reciprocal term and does not count toward |P|.
        let with_zero = adjusted_harmonic_mean(&[60.0, 70.0, 0.0]);
        let without = adjusted_harmonic_mean(&[60.0, 70.0]);
        assert!(close(with_zero, without, 1e-12));
    }

    #[test]
    fn no_positives_reports_the_floor() {
        assert_eq!(adjusted_harmonic_mean(&[-3.0, -8.0]), SSIMULACRA2_FLOOR);
        assert_eq!(adjusted_harmonic_mean(&[0.0]), SSIMULACRA2_FLOOR);
    }

    #[test]
    fn vbutter_scale() {
        // A perfect frame maps to 100; distance 2 lands near 69.9.
        assert!(close(butter_to_vbutter(0.0), 100.0, 1e-12));
        assert!(close(butter_to_vbutter(2.0), 69.897, 0.001));
        assert!(butter_to_vbutter(10.0) < butter_to_vbutter(2.0));
    }

    #[test]
    fn wxpsnr_of_equal_channels_is_unchanged() {
        assert!(close(weighted_xpsnr(40.0, 40.0, 40.0), 40.0, 1e-9));
        // Luma dominates: a weak Y channel pulls the composite down harder
        // than a weak chroma channel does.
        let weak_y = weighted_xpsnr(30.0, 40.0, 40.0);
        let weak_u = weighted_xpsnr(40.0, 30.0, 40.0);
        assert!(weak_y < weak_u);
    }

    #[test]
    fn max_value_picks_the_worst_frame() {
        assert_eq!(max_value(&[1.2, 4.5, 3.3]), 4.5);
    }
}
