// src/bdrate.rs
//
// Bjontegaard-Delta rate between two rate-distortion curves: PCHIP monotone
// cubic interpolation of metric -> log(bitrate), Simpson integration over the
// overlapping metric range, averaged log-bitrate difference converted back
// to a percentage. Degrades to an explicit status instead of crashing a
// batch comparison.

use log::debug;

/// Minimum distinct (metric, bitrate) points required per series. A 2-point
/// linear fallback is never silently substituted.
pub const MIN_POINTS: usize = 4;

/// Number of integration samples applied identically to both curves.
const INTEGRATION_SAMPLES: usize = 101;

/// Metric values reported as infinite (lossless XPSNR frames) are clamped
/// to this before fitting.
const INFINITE_METRIC_CAP: f64 = 100.0;

/// Outcome of one (metric, baseline vs comparison) evaluation. Insufficiency
/// is a status, never coerced to a misleading 0%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BdRate {
    /// Negative percent = the comparison series needs less bitrate for equal
    /// quality over the overlap.
    Delta { percent: f64, overlap: (f64, f64) },
    InsufficientPoints,
    InsufficientOverlap,
}

/// Compute the BD-rate between a baseline and a comparison series. Each
/// point is (bitrate, metric value); series need not arrive sorted.
pub fn bd_rate(baseline: &[(f64, f64)], comparison: &[(f64, f64)]) -> BdRate {
    let base = match prepare_series(baseline) {
        Some(s) => s,
        None => return BdRate::InsufficientPoints,
    };
    let cmp = match prepare_series(comparison) {
        Some(s) => s,
        None => return BdRate::InsufficientPoints,
    };

    // Overlapping metric interval where both fits have support.
    let lo = base.metric[0].max(cmp.metric[0]);
    let hi = base.metric[base.metric.len() - 1].min(cmp.metric[cmp.metric.len() - 1]);
    if hi <= lo {
        debug!("BD-rate overlap is empty ({:.4} .. {:.4})", lo, hi);
        return BdRate::InsufficientOverlap;
    }

    let base_fit = PchipFit::new(&base.metric, &base.log_rate);
    let cmp_fit = PchipFit::new(&cmp.metric, &cmp.log_rate);

    let step = (hi - lo) / (INTEGRATION_SAMPLES - 1) as f64;
    let sample = |fit: &PchipFit| -> Vec<f64> {
        (0..INTEGRATION_SAMPLES)
            .map(|i| fit.evaluate(lo + step * i as f64))
            .collect()
    };
    let int_base = simpson(&sample(&base_fit), step);
    let int_cmp = simpson(&sample(&cmp_fit), step);

    let avg_log_diff = (int_cmp - int_base) / (hi - lo);
    let percent = (avg_log_diff.exp() - 1.0) * 100.0;
    if !percent.is_finite() {
        // Ill-conditioned fit; BD-rate is advisory, report insufficiency.
        return BdRate::InsufficientPoints;
    }
    BdRate::Delta {
        percent,
        overlap: (lo, hi),
    }
}

struct PreparedSeries {
    metric: Vec<f64>,
    log_rate: Vec<f64>,
}

/// Sort by metric value, clamp infinite metric values, log-transform the
/// bitrates, and drop duplicate metric abscissae (the interpolant needs
/// strictly increasing knots). Returns None when fewer than MIN_POINTS
/// usable points remain or any bitrate is non-positive.
fn prepare_series(points: &[(f64, f64)]) -> Option<PreparedSeries> {
    let mut pts: Vec<(f64, f64)> = points
        .iter()
        .map(|&(rate, metric)| {
            let m = if metric.is_infinite() { INFINITE_METRIC_CAP } else { metric };
            (rate, m)
        })
        .collect();
    if pts.iter().any(|(r, m)| *r <= 0.0 || !r.is_finite() || !m.is_finite()) {
        return None;
    }
    pts.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup_by(|a, b| a.1 == b.1);
    if pts.len() < MIN_POINTS {
        return None;
    }
    Some(PreparedSeries {
        metric: pts.iter().map(|(_, m)| *m).collect(),
        log_rate: pts.iter().map(|(r, _)| r.ln()).collect(),
    })
}

/// Piecewise Cubic Hermite Interpolating Polynomial over strictly increasing
/// knots, with Fritsch-Carlson slope selection so the fit preserves the
/// monotonicity of the data.
struct PchipFit {
    x: Vec<f64>,
    y: Vec<f64>,
    slopes: Vec<f64>,
}

impl PchipFit {
    fn new(x: &[f64], y: &[f64]) -> PchipFit {
        let n = x.len();
        debug_assert!(n >= 3 && n == y.len());
        let h: Vec<f64> = (0..n - 1).map(|i| x[i + 1] - x[i]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

        let mut slopes = vec![0.0; n];
        for i in 1..n - 1 {
            if delta[i - 1] == 0.0 || delta[i] == 0.0 || delta[i - 1].signum() != delta[i].signum()
            {
                slopes[i] = 0.0;
            } else {
                // Weighted harmonic mean of the neighboring secants.
                let w1 = 2.0 * h[i] + h[i - 1];
                let w2 = h[i] + 2.0 * h[i - 1];
                slopes[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
            }
        }
        slopes[0] = edge_slope(h[0], h[1], delta[0], delta[1]);
        slopes[n - 1] = edge_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);

        PchipFit {
            x: x.to_vec(),
            y: y.to_vec(),
            slopes,
        }
    }

    /// Evaluate the fit at `t`. Values outside the knot range extrapolate
    /// from the nearest segment; callers restrict sampling to the overlap.
    fn evaluate(&self, t: f64) -> f64 {
        let n = self.x.len();
        // Index of the segment whose left knot is the last one <= t.
        let seg = match self.x.partition_point(|&k| k <= t) {
            0 => 0,
            p => (p - 1).min(n - 2),
        };
        let h = self.x[seg + 1] - self.x[seg];
        let s = (t - self.x[seg]) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.y[seg]
            + h10 * h * self.slopes[seg]
            + h01 * self.y[seg + 1]
            + h11 * h * self.slopes[seg + 1]
    }
}

/// One-sided three-point slope estimate for the boundary knots, clamped so
/// the interpolant cannot overshoot the boundary secant.
fn edge_slope(h0: f64, h1: f64, delta0: f64, delta1: f64) -> f64 {
    let mut d = ((2.0 * h0 + h1) * delta0 - h0 * delta1) / (h0 + h1);
    if d.signum() != delta0.signum() {
        d = 0.0;
    } else if delta0.signum() != delta1.signum() && d.abs() > 3.0 * delta0.abs() {
        d = 3.0 * delta0;
    }
    d
}

/// Composite Simpson's rule over uniformly spaced samples. The sample count
/// is odd, so the interval count is even and no end correction is needed.
fn simpson(values: &[f64], step: f64) -> f64 {
    let n = values.len();
    debug_assert!(n >= 3 && n % 2 == 1);
    let mut sum = values[0] + values[n - 1];
    for (i, v) in values.iter().enumerate().take(n - 1).skip(1) {
        sum += if i % 2 == 1 { 4.0 * v } else { 2.0 * v };
    }
    sum * step / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<(f64, f64)> {
        // (bitrate kbps, metric) with the usual inverse quality/bitrate shape
        vec![
            (1000.0, 78.0),
            (2000.0, 84.0),
            (4000.0, 89.0),
            (8000.0, 93.0),
            (16000.0, 96.0),
        ]
    }

    #[test]
    fn self_comparison_is_zero() {
        let s = series();
        match bd_rate(&s, &s) {
            BdRate::Delta { percent, .. } => assert!(percent.abs() < 1e-6),
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn doubled_bitrate_costs_one_hundred_percent() {
        let base = series();
        let doubled: Vec<(f64, f64)> = base.iter().map(|&(r, m)| (2.0 * r, m)).collect();
        match bd_rate(&base, &doubled) {
            BdRate::Delta { percent, .. } => assert!((percent - 100.0).abs() < 1e-6),
            other => panic!("expected delta, got {:?}", other),
        }
        // And symmetrically, halving saves ~50%.
        match bd_rate(&doubled, &base) {
            BdRate::Delta { percent, .. } => assert!((percent + 50.0).abs() < 1e-6),
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn too_few_points_is_reported_not_guessed() {
        let short = &series()[..3];
        assert_eq!(bd_rate(short, &series()), BdRate::InsufficientPoints);
        assert_eq!(bd_rate(&series(), short), BdRate::InsufficientPoints);
    }

    #[test]
    fn duplicate_metric_values_do_not_count_as_distinct_points() {
        let flat = vec![
            (1000.0, 90.0),
            (2000.0, 90.0),
            (4000.0, 90.0),
            (8000.0, 91.0),
        ];
        assert_eq!(bd_rate(&flat, &series()), BdRate::InsufficientPoints);
    }

    #[test]
    fn disjoint_metric_ranges_report_insufficient_overlap() {
        let low: Vec<(f64, f64)> = vec![
            (500.0, 10.0),
            (1000.0, 20.0),
            (2000.0, 30.0),
            (4000.0, 40.0),
        ];
        assert_eq!(bd_rate(&low, &series()), BdRate::InsufficientOverlap);
    }

    #[test]
    fn non_positive_bitrate_is_insufficient() {
        let mut bad = series();
        bad[0].0 = 0.0;
        assert_eq!(bd_rate(&bad, &series()), BdRate::InsufficientPoints);
    }

    #[test]
    fn unsorted_input_is_handled() {
        let mut shuffled = series();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);
        match bd_rate(&shuffled, &series()) {
            BdRate::Delta { percent, .. } => assert!(percent.abs() < 1e-6),
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn better_curve_yields_negative_delta() {
        // Comparison reaches the same metric at 20% less bitrate everywhere.
        let base = series();
        let better: Vec<(f64, f64)> = base.iter().map(|&(r, m)| (0.8 * r, m)).collect();
        match bd_rate(&base, &better) {
            BdRate::Delta { percent, .. } => assert!((percent + 20.0).abs() < 1e-6),
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn pchip_passes_through_knots() {
        let x = [1.0, 2.0, 4.0, 7.0];
        let y = [3.0, 5.0, 6.0, 6.5];
        let fit = PchipFit::new(&x, &y);
        for (&xi, &yi) in x.iter().zip(y.iter()) {
            assert!((fit.evaluate(xi) - yi).abs() < 1e-12);
        }
        // Monotone data stays monotone between knots.
        let mut prev = fit.evaluate(1.0);
        let mut t: f64 = 1.0;
        while t < 7.0 {
            t += 0.05;
            let v = fit.evaluate(t.min(7.0));
            assert!(v >= prev - 1e-12);
            prev = v;
        }
    }

    #[test]
    fn simpson_integrates_cubics_exactly() {
        // Simpson is exact for polynomials up to degree 3.
        let n = 101;
        let (a, b) = (0.0f64, 2.0f64);
        let step = (b - a) / (n - 1) as f64;
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let t: f64 = a + step * i as f64;
                t.powi(3) - 2.0 * t + 1.0
            })
            .collect();
        // Antiderivative: t^4/4 - t^2 + t over [0,2] = 4 - 4 + 2 = 2
        assert!((simpson(&values, step) - 2.0).abs() < 1e-12);
    }
}
