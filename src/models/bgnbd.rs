//! Beta-Geometric/Negative-Binomial (BG/NBD) purchase-frequency model

use tracing::info;

use super::optimize::NelderMead;
use super::special::{ln_gamma, ln_hyp2f1, log_add_exp};
use super::{converged_point, Estimator, Fitted, PurchaseForecaster};
use crate::error::CltvError;
use crate::frame::CltvFrame;

const MODEL: &str = "BG/NBD";

/// Times are rescaled so the longest tenure equals this value while fitting
const TIME_SCALE_TARGET: f64 = 10.0;

/// Fitted BG/NBD parameters
///
/// `r`, `alpha` are the shape and scale of the Gamma prior on the purchase
/// rate; `a`, `b` the Beta prior on the per-purchase dropout probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaGeoParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

impl BetaGeoParams {
    /// Log-likelihood of one customer's `(frequency, recency, tenure)`
    pub fn log_likelihood(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        let BetaGeoParams { r, alpha, a, b } = *self;
        let x = frequency;

        let a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
        let a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
        let a3 = -(r + x) * (alpha + tenure).ln();

        if x > 0.0 {
            let a4 = a.ln() - (b + x.max(1.0) - 1.0).ln() - (r + x) * (alpha + recency).ln();
            a1 + a2 + log_add_exp(a3, a4)
        } else {
            a1 + a2 + a3
        }
    }

    /// Probability that a customer with this history has not dropped out
    pub fn probability_alive(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if frequency == 0.0 {
            return 1.0;
        }
        let BetaGeoParams { r, alpha, a, b } = *self;
        let x = frequency;
        let log_div = (r + x) * ((alpha + tenure) / (alpha + recency)).ln()
            + (a / (b + x - 1.0)).ln();
        1.0 / (1.0 + log_div.exp())
    }
}

impl PurchaseForecaster for BetaGeoParams {
    fn expected_purchases(&self, t: f64, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let BetaGeoParams { r, alpha, a, b } = *self;
        let x = frequency;

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + tenure + t);
        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);

        let first = (a + b + x - 1.0) / (a - 1.0);
        let second = 1.0 - (ln_hyp + (r + x) * ((alpha + tenure) / (alpha + t + tenure)).ln()).exp();
        let numerator = first * second;

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + tenure) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };

        numerator / denominator
    }
}

/// Maximum-likelihood fitter for [`BetaGeoParams`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaGeoFitter {
    /// L2 penalty on the parameters
    pub penalizer_coef: f64,
    pub optimizer: NelderMead,
}

impl Default for BetaGeoFitter {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl BetaGeoFitter {
    pub fn new(penalizer_coef: f64) -> Self {
        Self {
            penalizer_coef,
            optimizer: NelderMead::default(),
        }
    }

    fn validate(frame: &CltvFrame) -> Result<(), CltvError> {
        if frame.is_empty() {
            return Err(CltvError::EmptyFrame("selecting BG/NBD observations"));
        }
        for (i, id) in frame.customer_ids.iter().enumerate() {
            let (x, t_x, big_t) = (frame.frequency[i], frame.recency[i], frame.tenure[i]);
            if !(x.is_finite() && t_x.is_finite() && big_t.is_finite()) {
                return Err(CltvError::observation(id, "frequency, recency and tenure must be finite"));
            }
            if x < 0.0 || t_x < 0.0 {
                return Err(CltvError::observation(id, "frequency and recency must be non-negative"));
            }
            if t_x > big_t {
                return Err(CltvError::observation(
                    id,
                    format!("recency {t_x:.3} exceeds tenure {big_t:.3}"),
                ));
            }
        }
        Ok(())
    }
}

impl Estimator for BetaGeoFitter {
    type Params = BetaGeoParams;

    fn fit(&self, frame: &CltvFrame) -> Result<Fitted<BetaGeoParams>, CltvError> {
        Self::validate(frame)?;

        let max_tenure = frame.tenure.iter().copied().fold(0.0, f64::max);
        let scale = if max_tenure > 0.0 {
            TIME_SCALE_TARGET / max_tenure
        } else {
            1.0
        };
        let scaled: Vec<(f64, f64, f64)> = frame
            .frequency
            .iter()
            .zip(&frame.recency)
            .zip(&frame.tenure)
            .map(|((&x, &t_x), &big_t)| (x, t_x * scale, big_t * scale))
            .collect();
        let n = scaled.len() as f64;
        let penalizer = self.penalizer_coef;

        let objective = |log_params: &[f64]| -> f64 {
            let params = BetaGeoParams {
                r: log_params[0].exp(),
                alpha: log_params[1].exp(),
                a: log_params[2].exp(),
                b: log_params[3].exp(),
            };
            let total: f64 = scaled
                .iter()
                .map(|&(x, t_x, big_t)| params.log_likelihood(x, t_x, big_t))
                .sum();
            let penalty: f64 = [params.r, params.alpha, params.a, params.b]
                .iter()
                .map(|p| p * p)
                .sum();
            -total / n + penalizer * penalty
        };

        let minimum = converged_point(MODEL, self.optimizer.minimize(objective, &[0.0; 4]))?;
        let fitted = &minimum.point;
        let params = BetaGeoParams {
            r: fitted[0].exp(),
            alpha: fitted[1].exp() / scale,
            a: fitted[2].exp(),
            b: fitted[3].exp(),
        };

        let log_likelihood: f64 = frame
            .frequency
            .iter()
            .zip(&frame.recency)
            .zip(&frame.tenure)
            .map(|((&x, &t_x), &big_t)| params.log_likelihood(x, t_x, big_t))
            .sum();

        info!(
            r = params.r,
            alpha = params.alpha,
            a = params.a,
            b = params.b,
            log_likelihood,
            iterations = minimum.iterations,
            "fitted BG/NBD model"
        );

        Ok(Fitted {
            params,
            log_likelihood,
            iterations: minimum.iterations,
        })
    }
}
