//! Affine correction model estimation and application
//!
//! One model per metric, fitted by ordinary least squares on paired
//! (simulated, reference) summary observations. Absence of a model is a
//! first-class state (`Option`), not an error: the estimator returns `None`
//! below two valid pairs and the applier degrades to a logged passthrough.

use crate::series::TimeSeries;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Significance threshold for the slope p-value diagnostic.
pub const P_VALUE_WARN_THRESHOLD: f64 = 0.05;

/// Minimum coefficient of determination before a quality note is logged.
pub const R_SQUARED_WARN_THRESHOLD: f64 = 0.5;

/// Tracked correction metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Resultant head acceleration magnitude
    AccelerationMagnitude,
    /// Intracranial pressure at the impact side
    CoupPressure,
    /// Intracranial pressure opposite the impact side (signed)
    ContrecoupPressure,
    /// Time of the acceleration peak
    PeakTime,
}

impl Metric {
    /// All tracked metrics, in reporting order.
    pub const ALL: [Self; 4] = [
        Self::AccelerationMagnitude,
        Self::CoupPressure,
        Self::ContrecoupPressure,
        Self::PeakTime,
    ];

    /// Human-readable metric name for tables and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccelerationMagnitude => "Acceleration magnitude",
            Self::CoupPressure => "Coup pressure",
            Self::ContrecoupPressure => "Contrecoup pressure",
            Self::PeakTime => "Peak time",
        }
    }

    /// Analysis unit the model coefficients are expressed in.
    #[must_use]
    pub const fn analysis_unit(self) -> &'static str {
        match self {
            Self::AccelerationMagnitude => "m/s^2",
            Self::CoupPressure | Self::ContrecoupPressure => "mmHg",
            Self::PeakTime => "ms",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-metric affine correction model.
///
/// `corrected = slope * simulated + intercept`, with coefficients derived
/// in the metric's analysis unit.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionModel {
    metric: Metric,
    slope: f64,
    intercept: f64,
    r_squared: f64,
    p_value: f64,
    std_err: f64,
    samples: usize,
}

impl CorrectionModel {
    /// Fit a model by ordinary least squares over `pairs` of
    /// (simulated, reference) observations.
    ///
    /// Returns `None` (with a warning) for fewer than two pairs or a
    /// degenerate zero-variance predictor. Quality diagnostics
    /// (p-value, R²) are logged but never block model creation.
    #[must_use]
    pub fn fit(metric: Metric, pairs: &[(f64, f64)]) -> Option<Self> {
        let n = pairs.len();
        if n < 2 {
            warn!(metric = %metric, samples = n, "not enough paired data for regression");
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let nf = n as f64;
        let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / nf;
        let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / nf;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut syy = 0.0;
        for (x, y) in pairs {
            let dx = x - mean_x;
            let dy = y - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        if sxx <= 0.0 {
            warn!(metric = %metric, "predictor has zero variance, no model fitted");
            return None;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_res: f64 = pairs
            .iter()
            .map(|(x, y)| {
                let r = y - (slope * x + intercept);
                r * r
            })
            .sum();
        let r_squared = if syy > 0.0 {
            (1.0 - ss_res / syy).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let df = nf - 2.0;
        let (std_err, p_value) = if df > 0.0 {
            let std_err = (ss_res / df / sxx).sqrt();
            let p = if std_err > 0.0 {
                let t = slope / std_err;
                student_t_two_sided_p(t, df)
            } else {
                // Residual-free fit, slope exactly determined
                0.0
            };
            (std_err, p)
        } else {
            (0.0, f64::NAN)
        };

        let model = Self {
            metric,
            slope,
            intercept,
            r_squared,
            p_value,
            std_err,
            samples: n,
        };
        info!(
            metric = %metric,
            samples = n,
            "fitted {}: R^2 = {r_squared:.4}, p = {p_value:.4}",
            model.equation()
        );
        if p_value > P_VALUE_WARN_THRESHOLD {
            warn!(metric = %metric, "slope p-value {p_value:.4} > {P_VALUE_WARN_THRESHOLD}, linear relation may not be significant");
        }
        if r_squared < R_SQUARED_WARN_THRESHOLD {
            warn!(metric = %metric, "R^2 {r_squared:.4} < {R_SQUARED_WARN_THRESHOLD}, linear model explains little variance");
        }
        Some(model)
    }

    /// Correct one scalar value in analysis units.
    #[must_use]
    pub fn correct_value(&self, v: f64) -> f64 {
        self.slope * v + self.intercept
    }

    /// Human-readable model equation.
    #[must_use]
    pub fn equation(&self) -> String {
        format!(
            "{} = {:.4e} * sim + {:.4}",
            self.metric.name(),
            self.slope,
            self.intercept
        )
    }

    /// Metric this model corrects.
    #[must_use]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Fitted slope.
    #[must_use]
    pub const fn slope(&self) -> f64 {
        self.slope
    }

    /// Fitted intercept.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Coefficient of determination.
    #[must_use]
    pub const fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Two-sided p-value of the slope.
    #[must_use]
    pub const fn p_value(&self) -> f64 {
        self.p_value
    }

    /// Standard error of the slope.
    #[must_use]
    pub const fn std_err(&self) -> f64 {
        self.std_err
    }

    /// Number of paired observations the fit used.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }
}

/// Apply an optional model to a series in analysis units.
///
/// Model present: elementwise affine transform, time axis unchanged.
/// Model absent: passthrough clone, logged so a degraded run is never
/// silently indistinguishable from a corrected one.
#[must_use]
pub fn apply_correction(series: &TimeSeries, model: Option<&CorrectionModel>) -> TimeSeries {
    match model {
        Some(m) => series.map_values(|v| m.correct_value(v)),
        None => {
            warn!("no correction model available, passing series through unchanged");
            series.clone()
        }
    }
}

/// Correct one optional scalar with an optional model.
///
/// Absent operand yields absent; absent model passes the value through.
#[must_use]
pub fn correct_optional(value: Option<f64>, model: Option<&CorrectionModel>) -> Option<f64> {
    value.map(|v| model.map_or(v, |m| m.correct_value(v)))
}

/// Mean absolute percentage error over pairs where both operands are
/// present and the reference is non-zero. `None` when no such pair exists.
#[must_use]
pub fn mape(reference: &[Option<f64>], predicted: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (r, p) in reference.iter().zip(predicted) {
        if let (Some(r), Some(p)) = (r, p) {
            if *r != 0.0 {
                sum += ((r - p) / r).abs();
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let denom = count as f64;
    Some(sum / denom * 100.0)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom,
/// via the regularized incomplete beta function:
/// `p = I_{df/(df+t^2)}(df/2, 1/2)`.
fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    incomplete_beta(df / 2.0, 0.5, x)
}

/// Regularized incomplete beta function I_x(a, b), continued-fraction
/// evaluation (Lentz's method).
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // Symmetry keeps the continued fraction in its fast-converging region
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cont_frac(a, b, x) / a
    } else {
        1.0 - front * beta_cont_frac(b, a, 1.0 - x) / b
    }
}

fn beta_cont_frac(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        #[allow(clippy::cast_precision_loss)]
        let mf = m as f64;
        let m2 = 2.0 * mf;

        let aa = mf * (b - mf) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + mf) * (qab + mf) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of ln Γ(x), g = 7, n = 9.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = 0.999_999_999_999_809_9;
    for (i, c) in COEFFS.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let i = i as f64;
        acc += c / (x + i + 1.0);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_exact_line() {
        let pairs = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        let model = CorrectionModel::fit(Metric::AccelerationMagnitude, &pairs).unwrap();
        assert!((model.slope() - 2.0).abs() < 1e-12);
        assert!(model.intercept().abs() < 1e-12);
        assert!((model.r_squared() - 1.0).abs() < 1e-12);
        assert!(model.p_value() < 1e-9);
        assert!(model.std_err().abs() < 1e-9);
        assert_eq!(model.samples(), 3);
    }

    #[test]
    fn test_ols_with_intercept_and_noise() {
        // Roughly linear data, small symmetric residuals
        let pairs = [(0.0, 1.5), (1.0, 3.5), (2.0, 7.5), (3.0, 9.5)];
        let model = CorrectionModel::fit(Metric::CoupPressure, &pairs).unwrap();
        assert!((model.slope() - 2.8).abs() < 1e-9);
        assert!((model.intercept() - 1.3).abs() < 1e-9);
        assert!((model.r_squared() - 0.98).abs() < 1e-9);
        assert!(model.std_err() > 0.0);
        assert!(model.p_value() > 0.0 && model.p_value() < 0.05);
    }

    #[test]
    fn test_fit_requires_two_points() {
        assert!(CorrectionModel::fit(Metric::PeakTime, &[(1.0, 2.0)]).is_none());
        assert!(CorrectionModel::fit(Metric::PeakTime, &[]).is_none());
    }

    #[test]
    fn test_fit_rejects_zero_variance_predictor() {
        let pairs = [(5.0, 1.0), (5.0, 2.0), (5.0, 3.0)];
        assert!(CorrectionModel::fit(Metric::PeakTime, &pairs).is_none());
    }

    #[test]
    fn test_apply_correction_elementwise() {
        let pairs = [(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]; // y = 2x + 1
        let model = CorrectionModel::fit(Metric::CoupPressure, &pairs).unwrap();
        let series = TimeSeries::new(vec![0.0, 1.0], vec![10.0, 20.0]);
        let corrected = apply_correction(&series, Some(&model));
        assert_eq!(corrected.times(), series.times());
        assert!((corrected.values()[0] - 21.0).abs() < 1e-9);
        assert!((corrected.values()[1] - 41.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_correction_passthrough_without_model() {
        let series = TimeSeries::new(vec![0.0, 1.0], vec![10.0, 20.0]);
        let out = apply_correction(&series, None);
        assert_eq!(out, series);
    }

    #[test]
    fn test_correct_optional_absent_propagates() {
        let model = CorrectionModel::fit(
            Metric::PeakTime,
            &[(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)],
        )
        .unwrap();
        assert_eq!(correct_optional(None, Some(&model)), None);
        assert!((correct_optional(Some(2.0), Some(&model)).unwrap() - 4.0).abs() < 1e-9);
        assert!((correct_optional(Some(2.0), None).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_mape_skips_zero_and_missing_reference() {
        let reference = [Some(100.0), Some(0.0), None, Some(50.0)];
        let predicted = [Some(110.0), Some(5.0), Some(1.0), Some(45.0)];
        // |10/100| and |5/50| -> mean(0.1, 0.1) * 100
        let m = mape(&reference, &predicted).unwrap();
        assert!((m - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mape_none_without_usable_pairs() {
        assert_eq!(mape(&[Some(0.0), None], &[Some(1.0), Some(1.0)]), None);
    }

    #[test]
    fn test_student_t_reference_values() {
        // t = 2.0, df = 10: two-sided p ~= 0.07339
        let p = student_t_two_sided_p(2.0, 10.0);
        assert!((p - 0.073_39).abs() < 5e-4, "p = {p}");
        // t = 0 is maximally insignificant
        assert!((student_t_two_sided_p(0.0, 5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ln_gamma_known_values() {
        // Γ(5) = 24
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-10);
        // Γ(0.5) = sqrt(pi)
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }
}
