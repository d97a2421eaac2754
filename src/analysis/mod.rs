//! Conversion-rate significance analysis.
//!
//! The evaluator is a pure function of the four per-variant counts; it can
//! be recomputed at any time from the raw event log. Confidence comes from
//! a two-tailed two-proportion z-test; the significance verdict additionally
//! gates on the fixed minimum-sample and minimum-improvement thresholds.

pub mod report;

pub use report::TestReporter;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::storage::VariantLabel;

/// Per-variant counts fed to the evaluator.
///
/// `visitors` is a distinct-session view count, not a raw view-event count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCounts {
    pub visitors: i64,
    pub conversions: i64,
}

impl VariantCounts {
    /// Create counts from visitors and conversions
    pub fn new(visitors: i64, conversions: i64) -> Self {
        Self {
            visitors,
            conversions,
        }
    }

    /// Conversion rate; 0 when there are no visitors
    pub fn conversion_rate(&self) -> f64 {
        conversion_rate(self.conversions, self.visitors)
    }
}

/// Outcome of a significance evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// Variant "a" conversion rate.
    pub rate_a: f64,
    /// Variant "b" conversion rate.
    pub rate_b: f64,
    /// Relative improvement of "b" over "a", percent. 0 when "a" has no
    /// conversions (not a true lift in that case).
    pub improvement_pct: f64,
    /// Two-tailed z-test confidence, percent.
    pub confidence_pct: f64,
    /// Whether the difference passed the significance gate.
    pub is_significant: bool,
    /// "b" when improvement exceeds the threshold, "a" when it falls below
    /// the negated threshold, none while undecided.
    pub winning_variant: Option<VariantLabel>,
}

/// Conversion rate with a zero-visitor guard.
pub fn conversion_rate(conversions: i64, visitors: i64) -> f64 {
    if visitors > 0 {
        conversions as f64 / visitors as f64
    } else {
        0.0
    }
}

/// Significance evaluator with configured thresholds.
#[derive(Debug, Clone)]
pub struct SignificanceEvaluator {
    min_conversions: i64,
    min_improvement_pct: f64,
}

impl SignificanceEvaluator {
    /// Create an evaluator from analysis configuration
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            min_conversions: config.min_conversions as i64,
            min_improvement_pct: config.min_improvement_pct,
        }
    }

    /// Evaluate variant "b" against incumbent "a".
    pub fn evaluate(&self, a: VariantCounts, b: VariantCounts) -> Evaluation {
        let rate_a = a.conversion_rate();
        let rate_b = b.conversion_rate();

        let improvement_pct = if rate_a > 0.0 {
            (rate_b - rate_a) / rate_a * 100.0
        } else {
            0.0
        };

        let confidence_pct = two_proportion_confidence(a, b);

        let sample_ok =
            a.conversions >= self.min_conversions && b.conversions >= self.min_conversions;
        let is_significant = sample_ok && improvement_pct.abs() > self.min_improvement_pct;

        let winning_variant = if improvement_pct > self.min_improvement_pct {
            Some(VariantLabel::B)
        } else if improvement_pct < -self.min_improvement_pct {
            Some(VariantLabel::A)
        } else {
            None
        };

        Evaluation {
            rate_a,
            rate_b,
            improvement_pct,
            confidence_pct,
            is_significant,
            winning_variant,
        }
    }
}

impl Default for SignificanceEvaluator {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

/// Two-tailed two-proportion z-test confidence, in percent.
///
/// z = (p̂B - p̂A) / sqrt(p̂(1 - p̂)(1/nA + 1/nB)) with pooled p̂;
/// confidence = (1 - p) * 100. Returns 0 when either sample is empty or
/// the pooled variance vanishes (all or none converted).
pub fn two_proportion_confidence(a: VariantCounts, b: VariantCounts) -> f64 {
    if a.visitors == 0 || b.visitors == 0 {
        return 0.0;
    }

    let n_a = a.visitors as f64;
    let n_b = b.visitors as f64;
    let p_a = a.conversions as f64 / n_a;
    let p_b = b.conversions as f64 / n_b;

    let pooled = (a.conversions + b.conversions) as f64 / (n_a + n_b);
    let variance = pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b);
    if variance <= 0.0 {
        return 0.0;
    }

    let z = (p_b - p_a) / variance.sqrt();
    let p_two_tailed = 2.0 * (1.0 - standard_normal_cdf(z.abs()));

    ((1.0 - p_two_tailed) * 100.0).clamp(0.0, 100.0)
}

/// Standard normal CDF via the Abramowitz-Stegun 7.1.26 erf approximation
/// (absolute error < 1.5e-7).
fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let y = 1.0 - poly * (-x * x).exp();

    sign * y
}
